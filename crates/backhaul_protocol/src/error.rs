//! The exhaustive error kind taxonomy from spec §7, plus the top-level
//! error type every crate in the workspace converts into at its boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error classification. Every error surfaced by a stage,
/// adapter, or background job carries exactly one of these. `Integrity` and
/// `Internal` additionally trigger a `system_error` notification regardless
/// of the job's notification condition (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail")]
pub enum ErrorKind {
    /// Pre-run validation failure (bad cron expression, missing adapter, …).
    ConfigInvalid,
    /// Database or storage credentials rejected.
    AuthDenied,
    /// Network/DNS/TCP failure reaching a source or destination.
    Unreachable,
    /// An external process exited non-zero.
    SubprocessFailed {
        tool: String,
        code: i32,
        tail_stderr: String,
    },
    /// An external process was killed by a signal.
    SubprocessSignaled { tool: String, signal: i32 },
    /// Read/write failure: broken pipe, disk full, truncated stream.
    StreamIo,
    /// GCM auth-tag mismatch or sidecar checksum mismatch.
    Integrity,
    /// Listed but absent; distinct from a permission error.
    NotFound,
    /// The operation was cooperatively cancelled.
    Cancelled,
    /// An invariant was broken. Always a bug.
    Internal,
}

impl ErrorKind {
    /// Short machine code, stable across releases (used in logs and the
    /// execution store).
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ConfigInvalid => "CONFIG_INVALID",
            ErrorKind::AuthDenied => "AUTH_DENIED",
            ErrorKind::Unreachable => "UNREACHABLE",
            ErrorKind::SubprocessFailed { .. } => "SUBPROCESS_FAILED",
            ErrorKind::SubprocessSignaled { .. } => "SUBPROCESS_SIGNALED",
            ErrorKind::StreamIo => "STREAM_IO",
            ErrorKind::Integrity => "INTEGRITY",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// `Integrity` and `Internal` always escalate to a `system_error`
    /// notification, bypassing the job's notification condition (spec §7).
    pub fn always_notifies(&self) -> bool {
        matches!(self, ErrorKind::Integrity | ErrorKind::Internal)
    }
}

/// Top-level error type. Carries the classification plus a human message;
/// library crates return this (or a crate-local error that implements
/// `Into<BackhaulError>`), never a bare `anyhow::Error`, across a public
/// boundary.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[error("{message}")]
pub struct BackhaulError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BackhaulError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn stream_io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StreamIo, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integrity, message)
    }
}

impl From<std::io::Error> for BackhaulError {
    fn from(err: std::io::Error) -> Self {
        BackhaulError::new(ErrorKind::StreamIo, err.to_string())
    }
}
