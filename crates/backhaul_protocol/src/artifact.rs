//! Remote artifact metadata: the sidecar JSON contract (spec §3, §4.1) and
//! storage snapshots consumed by the alert monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DestinationId, ProfileId};

/// The `databases` field of a sidecar: how many logical databases the
/// artifact covers, and a human label for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabasesLabel {
    pub count: u32,
    pub label: String,
}

/// Encryption metadata captured after the cipher finalizes (spec §4.1):
/// the IV and auth tag never travel inside the ciphertext stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarEncryption {
    pub profile_id: ProfileId,
    /// Hex-encoded 12-16 byte IV.
    pub iv: String,
    /// Hex-encoded 16-byte GCM auth tag.
    pub auth_tag: String,
    /// Name of the file before compression/encryption, for recovery-kit
    /// tooling that wants to restore the original extension.
    pub original_name: String,
}

/// The `<file>.meta.json` sidecar written alongside every artifact. When
/// present, it is authoritative over execution history and path
/// conventions (spec §3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sidecar {
    pub job_name: String,
    pub source_name: String,
    pub source_type: String,
    pub databases: DatabasesLabel,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub encryption: Option<SidecarEncryption>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub compression: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Sidecar {
    /// Locked artifacts are excluded from retention slot capacity (spec §4.4).
    pub fn is_locked(&self) -> bool {
        self.locked.unwrap_or(false)
    }
}

/// A remote artifact as surfaced by a storage adapter's `list` operation,
/// joined with its sidecar when one was found. The retention planner
/// consumes exactly the `last_modified`/`locked` projection of this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub remote_path: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub sidecar: Option<Sidecar>,
}

impl Artifact {
    /// Locked status is read from the sidecar if one was resolved;
    /// artifacts with no sidecar are never treated as locked.
    pub fn is_locked(&self) -> bool {
        self.sidecar.as_ref().is_some_and(Sidecar::is_locked)
    }
}

/// A periodic `(destination, totalSize, fileCount, capturedAt)` sample
/// feeding the alert monitor (spec §3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub destination_id: DestinationId,
    pub total_size_bytes: u64,
    pub file_count: u64,
    pub captured_at: DateTime<Utc>,
}
