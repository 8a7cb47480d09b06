use backhaul_protocol::{BackhaulError, ErrorKind};
use thiserror::Error;

/// Errors surfaced by a [`crate::DatabaseAdapter`] backend.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database credentials rejected: {0}")]
    AuthDenied(String),
    #[error("could not reach database server: {0}")]
    Unreachable(String),
    #[error("{tool} exited with status {code}: {tail_stderr}")]
    SubprocessFailed {
        tool: String,
        code: i32,
        tail_stderr: String,
    },
    #[error("{tool} was terminated by signal {signal}")]
    SubprocessSignaled { tool: String, signal: i32 },
    #[error("dump/restore stream I/O failure: {0}")]
    StreamIo(String),
    #[error("invalid dialect/adapter configuration: {0}")]
    ConfigInvalid(String),
    #[error("required client binary not found: {0}")]
    ToolNotFound(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::StreamIo(err.to_string())
    }
}

impl From<DbError> for BackhaulError {
    fn from(err: DbError) -> Self {
        let kind = match &err {
            DbError::AuthDenied(_) => ErrorKind::AuthDenied,
            DbError::Unreachable(_) => ErrorKind::Unreachable,
            DbError::SubprocessFailed { tool, code, tail_stderr } => {
                return BackhaulError::new(
                    ErrorKind::SubprocessFailed {
                        tool: tool.clone(),
                        code: *code,
                        tail_stderr: tail_stderr.clone(),
                    },
                    err.to_string(),
                );
            }
            DbError::SubprocessSignaled { tool, signal } => {
                return BackhaulError::new(
                    ErrorKind::SubprocessSignaled {
                        tool: tool.clone(),
                        signal: *signal,
                    },
                    err.to_string(),
                );
            }
            DbError::StreamIo(_) => ErrorKind::StreamIo,
            DbError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            DbError::ToolNotFound(_) => ErrorKind::ConfigInvalid,
            DbError::Cancelled => ErrorKind::Cancelled,
        };
        BackhaulError::new(kind, err.to_string())
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;
