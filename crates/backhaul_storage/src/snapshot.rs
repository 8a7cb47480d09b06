//! Storage snapshot capture (spec §4.9): a point-in-time summary of one
//! destination's artifact tree, fed to the alert monitor. Lives here
//! rather than in `backhaul_alerts` since only the storage adapter knows
//! how to list a destination's contents.

use chrono::Utc;

use backhaul_protocol::{DestinationId, StorageSnapshot};

use crate::adapter::StorageAdapter;
use crate::error::StorageResult;

/// Lists `backups/` on `adapter` and summarizes it: total bytes across
/// every object, and a count of artifact files (sidecars are excluded
/// from the count since they track the same artifacts one-to-one).
pub async fn capture_snapshot(
    adapter: &dyn StorageAdapter,
    destination_id: DestinationId,
) -> StorageResult<StorageSnapshot> {
    let entries = adapter.list("backups").await?;
    let total_size_bytes = entries.iter().map(|entry| entry.size).sum();
    let file_count = entries.iter().filter(|entry| !entry.path.ends_with(".meta.json")).count() as u64;

    Ok(StorageSnapshot {
        destination_id,
        total_size_bytes,
        file_count,
        captured_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalFsAdapter;

    #[tokio::test]
    async fn sums_bytes_and_counts_artifacts_excluding_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalFsAdapter::new(dir.path());
        tokio::fs::create_dir_all(dir.path().join("backups/nightly")).await.unwrap();
        tokio::fs::write(dir.path().join("backups/nightly/a.sql.gz"), vec![0u8; 100]).await.unwrap();
        tokio::fs::write(dir.path().join("backups/nightly/a.sql.gz.meta.json"), vec![0u8; 10]).await.unwrap();

        let snapshot = capture_snapshot(&adapter, DestinationId::new()).await.unwrap();
        assert_eq!(snapshot.total_size_bytes, 110);
        assert_eq!(snapshot.file_count, 1);
    }
}
