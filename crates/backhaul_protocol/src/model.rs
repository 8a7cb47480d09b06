//! Core entity model (spec §3): sources, destinations, notification
//! channels, encryption profiles, and jobs.

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, DestinationId, JobId, ProfileId, SourceId};

/// Database engine family a `Source` talks to. The dialect layer (C3)
/// shapes dump/restore argv per `(kind, detected_version)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Postgres,
    Mysql,
    Mariadb,
    Mongo,
    Mssql,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Mysql => "mysql",
            DatabaseKind::Mariadb => "mariadb",
            DatabaseKind::Mongo => "mongo",
            DatabaseKind::Mssql => "mssql",
        }
    }
}

/// Storage backend family a `Destination` talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    LocalFs,
    S3,
    Ftp,
    WebDav,
    GoogleDrive,
}

/// Notification channel adapter family. Only the payload contract (§4.8)
/// is in scope; the adapters themselves are external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    Email,
    Discord,
    Slack,
    Telegram,
    Teams,
    Ntfy,
    Gotify,
    TwilioSms,
    GenericWebhook,
}

/// Compression chosen for an artifact. Recorded in the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    None,
    Gzip,
    Brotli,
}

impl CompressionKind {
    /// Conventional extension appended to the artifact path.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            CompressionKind::None => None,
            CompressionKind::Gzip => Some("gz"),
            CompressionKind::Brotli => Some("br"),
        }
    }
}

/// A database endpoint. `config` is the encrypted config blob opaque to
/// everything but the adapter that decodes it (§9 "duck-typed config"
/// redesign note — decoding is the adapter's responsibility, not a bag
/// passed around raw).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub kind: DatabaseKind,
    pub encrypted_config: Vec<u8>,
    /// Server version string detected on the last successful `test()`,
    /// consumed by the dialect selector.
    pub detected_version: Option<String>,
}

/// A storage endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: DestinationId,
    pub name: String,
    pub kind: StorageKind,
    pub encrypted_config: Vec<u8>,
}

/// A notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub encrypted_config: Vec<u8>,
}

/// A named symmetric encryption key. `wrapped_key` is the 32-byte data key
/// wrapped by the system master key (never stored in the clear).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionProfile {
    pub id: ProfileId,
    pub name: String,
    pub description: Option<String>,
    pub wrapped_key: Vec<u8>,
}

/// Retention policy embedded in a job (spec §3, §4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum RetentionPolicy {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "SIMPLE")]
    Simple { keep_count: u32 },
    #[serde(rename = "SMART")]
    Smart {
        daily: u32,
        weekly: u32,
        monthly: u32,
        yearly: u32,
    },
}

impl RetentionPolicy {
    /// `SIMPLE` requires `keepCount >= 1`; `SMART` bucket counts may be 0.
    pub fn is_valid(&self) -> bool {
        match self {
            RetentionPolicy::None => true,
            RetentionPolicy::Simple { keep_count } => *keep_count >= 1,
            RetentionPolicy::Smart { .. } => true,
        }
    }
}

/// When a job's notification channels fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationCondition {
    Always,
    SuccessOnly,
    FailureOnly,
}

/// A declared backup job: one source, one destination, a schedule, and a
/// retention policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub source_id: SourceId,
    pub destination_id: DestinationId,
    pub encryption_profile_id: Option<ProfileId>,
    pub compression: CompressionKind,
    pub cron_expression: String,
    pub enabled: bool,
    pub retention: RetentionPolicy,
    pub notification_channel_ids: Vec<ChannelId>,
    pub notification_condition: NotificationCondition,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_retention_requires_positive_keep_count() {
        assert!(!RetentionPolicy::Simple { keep_count: 0 }.is_valid());
        assert!(RetentionPolicy::Simple { keep_count: 1 }.is_valid());
    }

    #[test]
    fn smart_retention_allows_zero_buckets() {
        assert!(RetentionPolicy::Smart {
            daily: 0,
            weekly: 0,
            monthly: 0,
            yearly: 0,
        }
        .is_valid());
    }

    #[test]
    fn compression_extension_mapping() {
        assert_eq!(CompressionKind::Gzip.extension(), Some("gz"));
        assert_eq!(CompressionKind::None.extension(), None);
    }
}
