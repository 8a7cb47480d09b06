//! Local filesystem backend. Grounded on the temp-then-rename idiom used by
//! the workspace's own Parquet/CSV sinks: write to a sibling `.tmp` file and
//! rename into place so a reader never observes a partial upload.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::adapter::{normalize_path, StorageAdapter, StorageEntry, TestResult};
use crate::error::StorageResult;

pub struct LocalFsAdapter {
    root: PathBuf,
}

impl LocalFsAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, remote_path: &str) -> PathBuf {
        self.root.join(normalize_path(remote_path))
    }
}

#[async_trait]
impl StorageAdapter for LocalFsAdapter {
    fn name(&self) -> &str {
        "local"
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> StorageResult<()> {
        let dest = self.resolve(remote_path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut temp_name = dest
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        temp_name.push(".tmp");
        let temp = dest.with_file_name(temp_name);
        tokio::fs::copy(local_path, &temp).await?;
        tokio::fs::rename(&temp, &dest).await?;
        debug!(path = %dest.display(), "uploaded to local destination");
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> StorageResult<()> {
        let src = self.resolve(remote_path);
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, local_path).await?;
        Ok(())
    }

    async fn read(&self, remote_path: &str) -> StorageResult<Option<String>> {
        match tokio::fs::read_to_string(self.resolve(remote_path)).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<StorageEntry>> {
        let base = self.resolve(dir);
        let mut entries = Vec::new();
        if !base.exists() {
            return Ok(entries);
        }
        let mut stack = vec![base.clone()];
        while let Some(current) = stack.pop() {
            let mut read_dir = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    stack.push(path);
                    continue;
                }
                let relative = path
                    .strip_prefix(&self.root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                let last_modified: DateTime<Utc> = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                entries.push(StorageEntry {
                    name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                    path: relative,
                    size: meta.len(),
                    last_modified,
                });
            }
        }
        Ok(entries)
    }

    async fn delete(&self, remote_path: &str) -> StorageResult<()> {
        match tokio::fs::remove_file(self.resolve(remote_path)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn test(&self) -> StorageResult<TestResult> {
        let probe_path = ".backhaul_probe";
        let probe_file = self.resolve(probe_path);
        if let Some(parent) = probe_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Err(err) = tokio::fs::write(&probe_file, b"backhaul").await {
            return Ok(TestResult::failed(format!("write probe failed: {err}")));
        }
        if let Err(err) = tokio::fs::remove_file(&probe_file).await {
            warn!(error = %err, "failed to clean up storage probe file");
        }
        Ok(TestResult::ok("local filesystem round-trip succeeded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_download_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalFsAdapter::new(dir.path());

        let src = dir.path().join("source.txt");
        tokio::fs::write(&src, b"hello backhaul").await.unwrap();

        adapter.upload(&src, "jobs/a/file.txt").await.unwrap();

        let dest = dir.path().join("out.txt");
        adapter.download("jobs/a/file.txt", &dest).await.unwrap();
        let content = tokio::fs::read_to_string(&dest).await.unwrap();
        assert_eq!(content, "hello backhaul");
    }

    #[tokio::test]
    async fn read_of_missing_file_returns_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalFsAdapter::new(dir.path());
        let result = adapter.read("missing.meta.json").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_of_missing_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalFsAdapter::new(dir.path());
        adapter.delete("nope.txt").await.unwrap();
    }

    #[tokio::test]
    async fn list_is_recursive_and_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalFsAdapter::new(dir.path());
        tokio::fs::create_dir_all(dir.path().join("jobs/a")).await.unwrap();
        tokio::fs::write(dir.path().join("jobs/a/dump.sql.gz"), b"data").await.unwrap();

        let entries = adapter.list("jobs").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "jobs/a/dump.sql.gz");
        assert_eq!(entries[0].size, 4);
    }

    #[tokio::test]
    async fn test_probe_round_trips_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalFsAdapter::new(dir.path());
        let result = adapter.test().await.unwrap();
        assert!(result.ok);
        assert!(!dir.path().join(".backhaul_probe").exists());
    }
}
