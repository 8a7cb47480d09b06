//! Static adapter registry (spec REDESIGN FLAGS: a closed set of
//! capability-bearing structs keyed by a stable string id, not dynamic
//! discovery). Construction is async because the S3 backend needs to
//! resolve its credential chain.

use backhaul_protocol::StorageKind;

use crate::error::{StorageError, StorageResult};
use crate::ftp::{FtpAdapter, FtpConfig};
use crate::gdrive::{GoogleDriveAdapter, GoogleDriveConfig};
use crate::local::LocalFsAdapter;
use crate::s3::{S3Adapter, S3Config};
use crate::webdav::{WebDavAdapter, WebDavConfig};
use crate::StorageAdapter;

/// Builds the concrete adapter for a destination's kind and decrypted
/// config blob. `config_json` is the plaintext produced by decrypting the
/// destination's encrypted config blob (spec §3: "encrypted config blob").
pub async fn build_adapter(
    kind: StorageKind,
    config_json: &str,
) -> StorageResult<Box<dyn StorageAdapter>> {
    match kind {
        StorageKind::LocalFs => {
            let config: LocalFsDestinationConfig = parse(config_json)?;
            Ok(Box::new(LocalFsAdapter::new(config.root_path)))
        }
        StorageKind::S3 => {
            let config: S3Config = parse(config_json)?;
            Ok(Box::new(S3Adapter::new(config).await?))
        }
        StorageKind::Ftp => {
            let config: FtpConfig = parse(config_json)?;
            Ok(Box::new(FtpAdapter::new(config)))
        }
        StorageKind::WebDav => {
            let config: WebDavConfig = parse(config_json)?;
            Ok(Box::new(WebDavAdapter::new(config)))
        }
        StorageKind::GoogleDrive => {
            let config: GoogleDriveConfig = parse(config_json)?;
            Ok(Box::new(GoogleDriveAdapter::new(config)))
        }
    }
}

#[derive(serde::Deserialize)]
struct LocalFsDestinationConfig {
    root_path: String,
}

fn parse<T: serde::de::DeserializeOwned>(config_json: &str) -> StorageResult<T> {
    serde_json::from_str(config_json).map_err(|err| {
        StorageError::ConfigInvalid(format!("invalid destination config: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_json_shape_maps_to_config_invalid() {
        let result = build_adapter(StorageKind::LocalFs, "{}").await;
        assert!(matches!(result, Err(StorageError::ConfigInvalid(_))));
    }

    #[tokio::test]
    async fn local_fs_config_builds_adapter() {
        let result = build_adapter(StorageKind::LocalFs, r#"{"root_path":"/tmp/backhaul"}"#).await;
        assert!(result.is_ok());
    }
}
