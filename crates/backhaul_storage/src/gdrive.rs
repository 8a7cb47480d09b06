//! Google Drive backend. Speaks the Drive REST API v3 directly over
//! `reqwest` rather than the generated Google API client crates, matching
//! the rest of this crate's "narrow interface over a plain HTTP client"
//! shape. The destination config carries a long-lived OAuth access token;
//! refreshing it is an operator/credential-management concern out of scope
//! here (spec: "individual protocol quirks are out of scope except where
//! they constrain the pipeline").

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::adapter::{StorageAdapter, StorageEntry, TestResult};
use crate::error::{StorageError, StorageResult};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Decrypted destination config for the `GoogleDrive` adapter kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleDriveConfig {
    pub access_token: String,
    pub folder_id: String,
}

pub struct GoogleDriveAdapter {
    client: Client,
    config: GoogleDriveConfig,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(rename = "modifiedTime", default)]
    modified_time: Option<String>,
}

#[derive(Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

impl GoogleDriveAdapter {
    pub fn new(config: GoogleDriveConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn map_err(err: reqwest::Error) -> StorageError {
        StorageError::Unreachable(err.to_string())
    }

    /// Backhaul keys Drive files by a flat `remote_path` (forward-slash
    /// separated), but Drive itself is a flat namespace keyed by file id
    /// with a parent folder, so a single directory holds every artifact and
    /// the full path (with slashes replaced by `__`) is stored as the name.
    fn drive_name(remote_path: &str) -> String {
        remote_path.replace('/', "__")
    }

    async fn find_file_id(&self, remote_path: &str) -> StorageResult<Option<DriveFile>> {
        let name = Self::drive_name(remote_path);
        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            name.replace('\'', "\\'"),
            self.config.folder_id
        );
        let response = self
            .client
            .get(format!("{API_BASE}/files"))
            .bearer_auth(&self.config.access_token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name,size,modifiedTime)")])
            .send()
            .await
            .map_err(Self::map_err)?;
        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "Drive files.list failed: {}",
                response.status()
            )));
        }
        let mut list: DriveFileList = response.json().await.map_err(Self::map_err)?;
        Ok(if list.files.is_empty() {
            None
        } else {
            Some(list.files.remove(0))
        })
    }
}

#[async_trait]
impl StorageAdapter for GoogleDriveAdapter {
    fn name(&self) -> &str {
        "google_drive"
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> StorageResult<()> {
        if let Some(existing) = self.find_file_id(remote_path).await? {
            self.delete_by_id(&existing.id).await?;
        }

        let bytes = tokio::fs::read(local_path).await?;
        let metadata = json!({
            "name": Self::drive_name(remote_path),
            "parents": [self.config.folder_id],
        });
        let boundary = "backhaul-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n").as_bytes());
        body.extend_from_slice(metadata.to_string().as_bytes());
        body.extend_from_slice(format!("\r\n--{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n").as_bytes());
        body.extend_from_slice(&bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--").as_bytes());

        let response = self
            .client
            .post(format!("{UPLOAD_BASE}/files?uploadType=multipart"))
            .bearer_auth(&self.config.access_token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(Self::map_err)?;
        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "Drive files.create failed: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> StorageResult<()> {
        let Some(file) = self.find_file_id(remote_path).await? else {
            return Err(StorageError::NotFound(remote_path.to_string()));
        };
        let response = self
            .client
            .get(format!("{API_BASE}/files/{}", file.id))
            .bearer_auth(&self.config.access_token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(Self::map_err)?;
        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "Drive files.get failed: {}",
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
        let Some(file) = self.find_file_id(remote_path).await? else {
            return Ok(None);
        };
        let response = self
            .client
            .get(format!("{API_BASE}/files/{}", file.id))
            .bearer_auth(&self.config.access_token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(Self::map_err)?;
        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "Drive files.get failed: {}",
                response.status()
            )));
        }
        Ok(Some(response.text().await.map_err(Self::map_err)?))
    }

    async fn list(&self, _dir: &str) -> StorageResult<Vec<StorageEntry>> {
        let query = format!("'{}' in parents and trashed = false", self.config.folder_id);
        let response = self
            .client
            .get(format!("{API_BASE}/files"))
            .bearer_auth(&self.config.access_token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name,size,modifiedTime)")])
            .send()
            .await
            .map_err(Self::map_err)?;
        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "Drive files.list failed: {}",
                response.status()
            )));
        }
        let list: DriveFileList = response.json().await.map_err(Self::map_err)?;
        Ok(list
            .files
            .into_iter()
            .map(|file| StorageEntry {
                path: file.name.replace("__", "/"),
                name: file.name.clone(),
                size: file
                    .size
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                last_modified: file
                    .modified_time
                    .as_deref()
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(chrono::Utc::now),
            })
            .collect())
    }

    async fn delete(&self, remote_path: &str) -> StorageResult<()> {
        match self.find_file_id(remote_path).await? {
            Some(file) => self.delete_by_id(&file.id).await,
            None => Ok(()),
        }
    }

    async fn test(&self) -> StorageResult<TestResult> {
        let response = self
            .client
            .get(format!("{API_BASE}/files/{}", self.config.folder_id))
            .bearer_auth(&self.config.access_token)
            .query(&[("fields", "id")])
            .send()
            .await
            .map_err(Self::map_err)?;
        if response.status().is_success() {
            Ok(TestResult::ok("Google Drive folder is reachable"))
        } else {
            Ok(TestResult::failed(format!(
                "folder lookup failed: {}",
                response.status()
            )))
        }
    }
}

impl GoogleDriveAdapter {
    async fn delete_by_id(&self, file_id: &str) -> StorageResult<()> {
        let response = self
            .client
            .delete(format!("{API_BASE}/files/{file_id}"))
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(Self::map_err)?;
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(StorageError::Backend(format!(
                "Drive files.delete failed: {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_name_flattens_path_separators() {
        assert_eq!(GoogleDriveAdapter::drive_name("jobs/a/dump.sql.gz"), "jobs__a__dump.sql.gz");
    }
}
