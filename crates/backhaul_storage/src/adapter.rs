//! The storage adapter interface (spec §4.2): every destination kind is a
//! value satisfying this trait, looked up through the registry by a stable
//! string id rather than dispatched dynamically by adapter kind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;

/// One entry returned by `list`. Paths are always forward-slash and relative
/// to the destination root, regardless of backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Outcome of `test`: a round-trip write+delete probe.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub ok: bool,
    pub message: String,
}

impl TestResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Progress callback invoked with cumulative bytes transferred so far.
pub type ProgressSink<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// A destination backend: local filesystem, S3-compatible object storage,
/// FTP/FTPS, WebDAV, or Google Drive. `read`/`list`/`delete`/`test` all have
/// a default that reports the operation as unsupported, since every backend
/// implements `upload`/`download` but not every one is expected to implement
/// every optional operation equally well (spec §4.2: "some are optional").
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Human-readable adapter name, used in logs and the `test` probe.
    fn name(&self) -> &str;

    /// Upload `local_path` to `remote_path`. Must create parent
    /// "directories" as needed and be atomic from the reader's point of
    /// view (temp-then-rename where the backend permits it).
    async fn upload(&self, local_path: &std::path::Path, remote_path: &str) -> StorageResult<()>;

    /// Download `remote_path` to `local_path`.
    async fn download(&self, remote_path: &str, local_path: &std::path::Path)
        -> StorageResult<()>;

    /// Read a small remote file (sidecars) as UTF-8 text. "Not found" must
    /// return `Ok(None)`, never an error.
    async fn read(&self, remote_path: &str) -> StorageResult<Option<String>>;

    /// List entries recursively under `dir`, relative to the destination
    /// root.
    async fn list(&self, dir: &str) -> StorageResult<Vec<StorageEntry>>;

    /// Delete `remote_path`. Idempotent: deleting a missing file succeeds.
    async fn delete(&self, remote_path: &str) -> StorageResult<()>;

    /// Round-trip write+delete probe against a throwaway path.
    async fn test(&self) -> StorageResult<TestResult>;
}

/// Normalizes a path to forward-slash separators with no leading slash, so
/// the core never passes platform-specific separators to a backend.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .trim_start_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_converts_backslashes_and_strips_leading_slash() {
        assert_eq!(normalize_path("/a\\b\\c"), "a/b/c");
        assert_eq!(normalize_path("a/b/c"), "a/b/c");
    }
}
