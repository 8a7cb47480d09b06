//! FTP/FTPS backend. The spec treats individual protocol quirks as out of
//! scope except where they constrain the pipeline, so this backend keeps a
//! single connection per adapter instance and reconnects lazily rather than
//! pooling — backup/restore runs are long, low-concurrency transfers, not a
//! high-throughput FTP client.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use suppaftp::{types::FileType, AsyncFtpStream};
use tokio::sync::Mutex;

use crate::adapter::{normalize_path, StorageAdapter, StorageEntry, TestResult};
use crate::error::{StorageError, StorageResult};

/// Decrypted destination config for the `Ftp` adapter kind. `secure` selects
/// explicit FTPS (AUTH TLS) over plain FTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpConfig {
    pub host: String,
    #[serde(default = "default_ftp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub root_path: String,
}

fn default_ftp_port() -> u16 {
    21
}

pub struct FtpAdapter {
    config: FtpConfig,
    stream: Mutex<Option<AsyncFtpStream>>,
}

impl FtpAdapter {
    pub fn new(config: FtpConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
        }
    }

    fn map_err(err: impl std::fmt::Display) -> StorageError {
        StorageError::Backend(err.to_string())
    }

    fn remote(&self, remote_path: &str) -> String {
        let path = normalize_path(remote_path);
        if self.config.root_path.is_empty() {
            format!("/{path}")
        } else {
            format!("/{}/{}", self.config.root_path.trim_matches('/'), path)
        }
    }

    /// Runs `op` against a live connection, reconnecting first if the
    /// cached one dropped (idle timeout, server reset).
    async fn with_connection<T, F, Fut>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(&mut AsyncFtpStream) -> Fut,
        Fut: std::future::Future<Output = Result<T, suppaftp::FtpError>>,
    {
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let stream = guard.as_mut().expect("just connected");
        op(stream).await.map_err(Self::map_err)
    }

    async fn connect(&self) -> StorageResult<AsyncFtpStream> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let mut stream = AsyncFtpStream::connect(&addr)
            .await
            .map_err(Self::map_err)?;
        if self.config.secure {
            stream = stream
                .into_secure(
                    suppaftp::async_native_tls::TlsConnector::new(),
                    &self.config.host,
                )
                .await
                .map_err(Self::map_err)?;
        }
        stream
            .login(&self.config.username, &self.config.password)
            .await
            .map_err(Self::map_err)?;
        stream
            .transfer_type(FileType::Binary)
            .await
            .map_err(Self::map_err)?;
        Ok(stream)
    }

    async fn mkdir_recursive(stream: &mut AsyncFtpStream, remote_path: &str) -> StorageResult<()> {
        let parent = match remote_path.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => dir,
            _ => return Ok(()),
        };
        let mut built = String::new();
        for segment in parent.split('/').filter(|s| !s.is_empty()) {
            built.push('/');
            built.push_str(segment);
            // Best-effort: `mkdir` on an already-existing directory errors;
            // the goal is just that the directory exists afterward.
            let _ = stream.mkdir(&built).await;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for FtpAdapter {
    fn name(&self) -> &str {
        "ftp"
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> StorageResult<()> {
        let dest = self.remote(remote_path);
        let temp = format!("{dest}.tmp");
        let mut file = std::fs::File::open(local_path)?;

        self.with_connection(|stream| {
            let dest = dest.clone();
            let temp = temp.clone();
            async move {
                Self::mkdir_recursive(stream, &dest).await.ok();
                stream.put_file(&temp, &mut file).await?;
                stream.rename(&temp, &dest).await?;
                Ok(())
            }
        })
        .await
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> StorageResult<()> {
        let source = self.remote(remote_path);
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = self
            .with_connection(|stream| {
                let source = source.clone();
                async move {
                    let cursor = stream.retr_as_buffer(&source).await?;
                    Ok(cursor.into_inner())
                }
            })
            .await?;
        tokio::fs::write(local_path, bytes).await?;
        Ok(())
    }

    async fn read(&self, remote_path: &str) -> StorageResult<Option<String>> {
        let source = self.remote(remote_path);
        let result = self
            .with_connection(|stream| {
                let source = source.clone();
                async move {
                    let cursor = stream.retr_as_buffer(&source).await?;
                    Ok(cursor.into_inner())
                }
            })
            .await;

        match result {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(StorageError::Backend(message)) if message.to_lowercase().contains("550") => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<StorageEntry>> {
        let base = self.remote(dir);
        let names = self
            .with_connection(|stream| {
                let base = base.clone();
                async move { stream.nlst(Some(&base)).await }
            })
            .await?;

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let size = self
                .with_connection(|stream| {
                    let name = name.clone();
                    async move { stream.size(&name).await }
                })
                .await
                .unwrap_or(0);
            entries.push(StorageEntry {
                name: name.rsplit('/').next().unwrap_or(&name).to_string(),
                path: name.trim_start_matches('/').to_string(),
                size: size as u64,
                last_modified: chrono::Utc::now(),
            });
        }
        Ok(entries)
    }

    async fn delete(&self, remote_path: &str) -> StorageResult<()> {
        let target = self.remote(remote_path);
        let result = self
            .with_connection(|stream| {
                let target = target.clone();
                async move { stream.rm(&target).await }
            })
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(StorageError::Backend(message)) if message.contains("550") => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn test(&self) -> StorageResult<TestResult> {
        let probe = self.remote(".backhaul_probe");
        let mut data: &[u8] = b"backhaul";
        let result = self
            .with_connection(|stream| {
                let probe = probe.clone();
                async move {
                    stream.put_file(&probe, &mut data).await?;
                    stream.rm(&probe).await?;
                    Ok(())
                }
            })
            .await;
        match result {
            Ok(()) => Ok(TestResult::ok("FTP round-trip write+delete succeeded")),
            Err(err) => Ok(TestResult::failed(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> FtpAdapter {
        FtpAdapter::new(FtpConfig {
            host: "ftp.example.test".into(),
            port: 21,
            username: "user".into(),
            password: "pass".into(),
            secure: false,
            root_path: "backhaul".into(),
        })
    }

    #[test]
    fn remote_path_is_rooted_under_configured_root() {
        let adapter = adapter();
        assert_eq!(adapter.remote("jobs/a/file.sql.gz"), "/backhaul/jobs/a/file.sql.gz");
    }

    #[test]
    fn remote_path_without_root_is_absolute_from_server_root() {
        let mut config_adapter = adapter();
        config_adapter.config.root_path = String::new();
        assert_eq!(config_adapter.remote("dump.sql"), "/dump.sql");
    }
}
