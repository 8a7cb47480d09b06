//! The database adapter interface (spec §4.3): `test`, `listDatabases`,
//! `dump`, `restore`, each dialect-shaped per family and detected version.

use std::path::Path;

use async_trait::async_trait;
use backhaul_protocol::{CancellationToken, Reporter};
use serde::{Deserialize, Serialize};

use crate::error::DbResult;

/// Outcome of `test`.
#[derive(Debug, Clone)]
pub struct ConnectionTest {
    pub ok: bool,
    pub version: Option<String>,
    pub message: String,
}

/// Outcome of `dump`/`restore`.
#[derive(Debug, Clone, Default)]
pub struct OperationResult {
    pub ok: bool,
    pub bytes_written: Option<u64>,
    pub error: Option<String>,
}

impl OperationResult {
    pub fn success(bytes_written: u64) -> Self {
        Self {
            ok: true,
            bytes_written: Some(bytes_written),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            bytes_written: None,
            error: Some(message.into()),
        }
    }
}

/// One entry of a multi-database restore's `{originalName -> {targetName,
/// selected}}` mapping (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseMapping {
    pub target_name: String,
    pub selected: bool,
}

/// Privileged credentials used by `prepareRestore`/`restore` to create
/// missing target databases, separate from the regular connection config.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrivilegedAuth {
    pub username: String,
    pub password: String,
}

#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Round-trip connectivity probe; `version` is populated when the
    /// server reports one.
    async fn test(&self) -> DbResult<ConnectionTest>;

    /// Lists database names visible to the configured credentials.
    async fn list_databases(&self) -> DbResult<Vec<String>>;

    /// Streams a logical dump to `dest_path`. The dialect may append an
    /// extension (`.gz`, `.archive`) to the path it actually wrote; the
    /// returned `OperationResult` does not carry the final path — the
    /// Runner re-globs/inspects `dest_path`'s parent per spec §4.5 stage 2.
    async fn dump(
        &self,
        dest_path: &Path,
        cancel: &CancellationToken,
        reporter: &dyn Reporter,
    ) -> DbResult<OperationResult>;

    /// Restores from `src_path`. `mapping` renames/filters databases for
    /// multi-database restores; `privileged_auth` is used to create
    /// missing target databases when set.
    async fn restore(
        &self,
        src_path: &Path,
        mapping: Option<&std::collections::HashMap<String, DatabaseMapping>>,
        privileged_auth: Option<&PrivilegedAuth>,
        cancel: &CancellationToken,
        reporter: &dyn Reporter,
    ) -> DbResult<OperationResult>;
}
