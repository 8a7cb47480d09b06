//! S3-compatible object storage backend. Grounded on the nearest production
//! example's `storage::s3::S3Backend`, adapted to the narrower
//! upload/download/read/list/delete/test contract and to streaming
//! local-file transfer (`ByteStream::from_path`) rather than buffering the
//! whole object in memory.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::{config::Region, primitives::ByteStream, Client};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::adapter::{normalize_path, StorageAdapter, StorageEntry, TestResult};
use crate::error::{StorageError, StorageResult};

/// Decrypted destination config for the `S3` adapter kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default)]
    pub prefix: String,
    /// Forces path-style addressing, required by most non-AWS S3-compatible
    /// providers (MinIO, Backblaze B2, …).
    #[serde(default)]
    pub force_path_style: bool,
}

pub struct S3Adapter {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Adapter {
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let mut builder = aws_config::from_env().region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        let loaded = builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&loaded);
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            let credentials = aws_sdk_s3::config::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "backhaul-destination",
            );
            s3_config_builder = s3_config_builder.credentials_provider(credentials);
        }

        Ok(Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket: config.bucket,
            prefix: config.prefix,
        })
    }

    fn key(&self, remote_path: &str) -> String {
        let path = normalize_path(remote_path);
        if self.prefix.is_empty() {
            path
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), path)
        }
    }

    fn map_err(err: impl std::fmt::Display) -> StorageError {
        StorageError::Backend(err.to_string())
    }
}

#[async_trait]
impl StorageAdapter for S3Adapter {
    fn name(&self) -> &str {
        "s3"
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> StorageResult<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(Self::map_err)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(remote_path))
            .body(body)
            .send()
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> StorageResult<()> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(remote_path))
            .send()
            .await
            .map_err(Self::map_err)?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut body = output.body.into_async_read();
        let mut file = tokio::fs::File::create(local_path).await?;
        tokio::io::copy(&mut body, &mut file).await?;
        Ok(())
    }

    async fn read(&self, remote_path: &str) -> StorageResult<Option<String>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(remote_path))
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                if is_not_found(&err) {
                    return Ok(None);
                }
                return Err(Self::map_err(err));
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(Self::map_err)?
            .into_bytes();
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<StorageEntry>> {
        let prefix = self.key(dir);
        let mut entries = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if !prefix.is_empty() {
                request = request.prefix(&prefix);
            }
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }
            let output = request.send().await.map_err(Self::map_err)?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                let relative = key
                    .strip_prefix(&format!("{}/", self.prefix))
                    .unwrap_or(key)
                    .to_string();
                entries.push(StorageEntry {
                    name: relative.rsplit('/').next().unwrap_or(&relative).to_string(),
                    path: relative,
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|dt| {
                            chrono::DateTime::parse_from_rfc3339(&dt.to_string()).ok()
                        })
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(Utc::now),
                });
            }

            if output.is_truncated().unwrap_or(false) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(entries)
    }

    async fn delete(&self, remote_path: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key(remote_path))
            .send()
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn test(&self) -> StorageResult<TestResult> {
        let probe_key = self.key(".backhaul_probe");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&probe_key)
            .body(ByteStream::from_static(b"backhaul"))
            .send()
            .await
            .map_err(Self::map_err)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&probe_key)
            .send()
            .await
            .map_err(Self::map_err)?;
        Ok(TestResult::ok(format!(
            "round-trip write+delete succeeded against bucket {}",
            self.bucket
        )))
    }
}

fn is_not_found<E>(err: &aws_sdk_s3::error::SdkError<E>) -> bool
where
    E: std::fmt::Debug,
{
    matches!(
        err,
        aws_sdk_s3::error::SdkError::ServiceError(service_err)
            if format!("{:?}", service_err.err()).contains("NoSuchKey")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_applies_destination_prefix() {
        let adapter = S3Adapter {
            client: Client::from_conf(
                aws_sdk_s3::config::Builder::new()
                    .region(Region::new("us-east-1"))
                    .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
                    .build(),
            ),
            bucket: "bucket".into(),
            prefix: "backhaul".into(),
        };
        assert_eq!(adapter.key("jobs/a/file.sql.gz"), "backhaul/jobs/a/file.sql.gz");
    }

    #[test]
    fn key_with_no_prefix_passes_path_through() {
        let adapter = S3Adapter {
            client: Client::from_conf(
                aws_sdk_s3::config::Builder::new()
                    .region(Region::new("us-east-1"))
                    .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
                    .build(),
            ),
            bucket: "bucket".into(),
            prefix: String::new(),
        };
        assert_eq!(adapter.key("jobs/a/file.sql.gz"), "jobs/a/file.sql.gz");
    }
}
