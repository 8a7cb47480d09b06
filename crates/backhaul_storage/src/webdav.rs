//! WebDAV backend. Uses `PROPFIND`/`MKCOL`/`PUT`/`GET`/`DELETE` against a
//! base URL; authentication is HTTP basic. Response bodies are small
//! (directory listings, never the dump itself, which streams through
//! `upload`/`download`), so the PROPFIND multistatus body is scanned with
//! plain substring extraction rather than pulling in a general XML parser —
//! the spec treats WebDAV's protocol quirks as out of scope beyond what the
//! pipeline needs.

use std::path::Path;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::adapter::{normalize_path, StorageAdapter, StorageEntry, TestResult};
use crate::error::{StorageError, StorageResult};

/// Decrypted destination config for the `WebDav` adapter kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebDavConfig {
    /// Base collection URL, e.g. `https://dav.example.com/backups/`.
    pub base_url: String,
    pub username: String,
    pub password: String,
}

pub struct WebDavAdapter {
    client: Client,
    config: WebDavConfig,
}

impl WebDavAdapter {
    pub fn new(config: WebDavConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, remote_path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            normalize_path(remote_path)
        )
    }

    fn map_err(err: reqwest::Error) -> StorageError {
        StorageError::Unreachable(err.to_string())
    }

    async fn ensure_parent_collections(&self, remote_path: &str) -> StorageResult<()> {
        let path = normalize_path(remote_path);
        let Some((dir, _)) = path.rsplit_once('/') else {
            return Ok(());
        };
        let mut built = String::new();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            built.push_str(segment);
            built.push('/');
            let collection_url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), built);
            // MKCOL on an existing collection returns 405; both are fine.
            let _ = self
                .client
                .request(reqwest::Method::from_bytes(b"MKCOL").unwrap(), &collection_url)
                .basic_auth(&self.config.username, Some(&self.config.password))
                .send()
                .await;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for WebDavAdapter {
    fn name(&self) -> &str {
        "webdav"
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> StorageResult<()> {
        self.ensure_parent_collections(remote_path).await?;
        let temp_path = format!("{remote_path}.tmp");
        let body = tokio::fs::read(local_path).await?;

        let response = self
            .client
            .put(self.url(&temp_path))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .body(body)
            .send()
            .await
            .map_err(Self::map_err)?;
        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "PUT {} failed: {}",
                temp_path,
                response.status()
            )));
        }

        let move_response = self
            .client
            .request(reqwest::Method::from_bytes(b"MOVE").unwrap(), self.url(&temp_path))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Destination", self.url(remote_path))
            .header("Overwrite", "T")
            .send()
            .await
            .map_err(Self::map_err)?;
        if !move_response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "MOVE {} -> {} failed: {}",
                temp_path,
                remote_path,
                move_response.status()
            )));
        }
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> StorageResult<()> {
        let response = self
            .client
            .get(self.url(remote_path))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(Self::map_err)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(remote_path.to_string()));
        }
        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "GET {} failed: {}",
                remote_path,
                response.status()
            )));
        }
        let bytes = response.bytes().await.map_err(Self::map_err)?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, bytes).await?;
        Ok(())
    }

    async fn read(&self, remote_path: &str) -> StorageResult<Option<String>> {
        let response = self
            .client
            .get(self.url(remote_path))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(Self::map_err)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "GET {} failed: {}",
                remote_path,
                response.status()
            )));
        }
        Ok(Some(response.text().await.map_err(Self::map_err)?))
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<StorageEntry>> {
        let response = self
            .client
            .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), self.url(dir))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Depth", "infinity")
            .send()
            .await
            .map_err(Self::map_err)?;
        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "PROPFIND {} failed: {}",
                dir,
                response.status()
            )));
        }
        let body = response.text().await.map_err(Self::map_err)?;
        Ok(parse_propfind_hrefs(&body, dir))
    }

    async fn delete(&self, remote_path: &str) -> StorageResult<()> {
        let response = self
            .client
            .delete(self.url(remote_path))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(Self::map_err)?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(StorageError::Backend(format!(
                "DELETE {} failed: {}",
                remote_path,
                response.status()
            )))
        }
    }

    async fn test(&self) -> StorageResult<TestResult> {
        let probe = ".backhaul_probe";
        let response = self
            .client
            .put(self.url(probe))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .body(b"backhaul".to_vec())
            .send()
            .await
            .map_err(Self::map_err)?;
        if !response.status().is_success() {
            return Ok(TestResult::failed(format!(
                "PUT probe failed: {}",
                response.status()
            )));
        }
        self.delete(probe).await?;
        Ok(TestResult::ok("WebDAV round-trip write+delete succeeded"))
    }
}

/// Extracts `<D:href>` entries from a PROPFIND multistatus body, skipping
/// the collection itself (the first href, which always echoes `dir`).
fn parse_propfind_hrefs(body: &str, dir: &str) -> Vec<StorageEntry> {
    let mut entries = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("href>") {
        let after_open = &rest[start + "href>".len()..];
        let Some(end) = after_open.find("</") else {
            break;
        };
        let href = &after_open[..end];
        rest = &after_open[end..];

        let decoded = href.trim_end_matches('/');
        if decoded.is_empty() || decoded.ends_with(dir.trim_end_matches('/')) {
            continue;
        }
        let name = decoded.rsplit('/').next().unwrap_or(decoded).to_string();
        entries.push(StorageEntry {
            name,
            path: normalize_path(decoded),
            size: 0,
            last_modified: chrono::Utc::now(),
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_propfind_hrefs_skips_the_requested_collection() {
        let body = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:">
  <D:response><D:href>/backups/</D:href></D:response>
  <D:response><D:href>/backups/job.sql.gz</D:href></D:response>
</D:multistatus>"#;
        let entries = parse_propfind_hrefs(body, "/backups/");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "job.sql.gz");
    }
}
