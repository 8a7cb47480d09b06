//! Stage-weighted progress and the transform helpers (compress/encrypt,
//! decrypt/decompress) shared by the backup and restore pipelines
//! (spec §4.5).

use std::path::{Path, PathBuf};

use backhaul_protocol::{BackhaulError, CompressionKind, DatabaseKind, LogLevel, LogType};

use crate::context::RunnerContext;

/// Coarse per-stage progress weights. Dump and upload dominate; transform
/// and sidecar writes are folded into the stage they ride along with.
pub const WEIGHT_DUMP: f32 = 0.50;
pub const WEIGHT_UPLOAD: f32 = 0.40;
pub const WEIGHT_RETENTION: f32 = 0.05;
pub const WEIGHT_FINALIZE: f32 = 0.05;

/// The extension a fresh dump is given before any transform runs. Mirrors
/// what each dialect actually writes (spec §4.3): Postgres custom-format
/// dumps use `.dump`, everything else is plain SQL or an adapter-native
/// archive/backup file.
pub fn dump_extension(kind: DatabaseKind) -> &'static str {
    match kind {
        DatabaseKind::Postgres => "dump",
        DatabaseKind::Mysql | DatabaseKind::Mariadb => "sql",
        DatabaseKind::Mongo => "archive",
        DatabaseKind::Mssql => "bak",
    }
}

/// Whether a dialect's own dump format already applies compression
/// internally, so the transform stage must not compress it a second time.
/// Postgres custom format (`-Fc --compress=6`) and `mongodump --gzip` both
/// do; plain-SQL and `.bak` dumps do not.
pub fn dump_already_compressed(kind: DatabaseKind) -> bool {
    matches!(kind, DatabaseKind::Postgres | DatabaseKind::Mongo)
}

/// Appends `.ext` to a path's existing file name, keeping the original
/// extension intact (`dump.sql` -> `dump.sql.gz`).
pub fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(ext);
    path.with_file_name(name)
}

/// Strips one trailing extension added by a transform step, for the
/// restore pipeline walking the chain backwards (`dump.sql.gz.enc` ->
/// `dump.sql.gz` -> `dump.sql`).
pub fn strip_extension(path: &Path) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_os_string();
    path.with_file_name(stem)
}

/// Compresses `ctx.temp_path` in place (spec §4.5 Transform), skipping the
/// step entirely when compression is off or the dialect already compressed
/// its own output. Runs on a blocking thread since dumps can be large.
pub async fn compress_in_place(
    ctx: &mut RunnerContext<'_>,
    compression: CompressionKind,
    already_compressed: bool,
) -> Result<(), BackhaulError> {
    if compression == CompressionKind::None || already_compressed {
        return Ok(());
    }
    let ext = compression
        .extension()
        .expect("non-None compression always carries an extension");
    let current = ctx.temp_path.clone().expect("dump stage sets temp_path");
    let target = append_extension(&current, ext);

    ctx.log(LogLevel::Info, LogType::Transform, format!("compressing dump ({ext})"));
    let target_for_blocking = target.clone();
    let current_for_blocking = current.clone();
    tokio::task::spawn_blocking(move || -> Result<(), BackhaulError> {
        let input = std::fs::File::open(&current_for_blocking)?;
        let output = std::fs::File::create(&target_for_blocking)?;
        backhaul_codec::compress_stream(input, output, compression)?;
        Ok(())
    })
    .await
    .map_err(|err| BackhaulError::internal(format!("compression task panicked: {err}")))??;

    tokio::fs::remove_file(&current).await?;
    ctx.temp_path = Some(target);
    Ok(())
}

/// Decompresses `input_path` into `output_path` (spec §4.5 restore mirror).
pub async fn decompress_to(
    input_path: PathBuf,
    output_path: PathBuf,
    compression: CompressionKind,
) -> Result<(), BackhaulError> {
    tokio::task::spawn_blocking(move || -> Result<(), BackhaulError> {
        let input = std::fs::File::open(&input_path)?;
        let output = std::fs::File::create(&output_path)?;
        backhaul_codec::decompress_stream(input, output, compression)?;
        Ok(())
    })
    .await
    .map_err(|err| BackhaulError::internal(format!("decompression task panicked: {err}")))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use backhaul_protocol::{
        CompositeReporter, DatabaseKind, Destination, DestinationId, Execution, ExecutionKind,
        Job, JobId, NotificationCondition, RetentionPolicy, Source, SourceId, StorageKind,
    };
    use backhaul_security::SecretStore;
    use std::io::Write;

    fn test_context<'a>(secret_store: &'a SecretStore, compression: CompressionKind) -> RunnerContext<'a> {
        let job_id = JobId::new();
        let source_id = SourceId::new();
        let destination_id = DestinationId::new();
        let job = Job {
            id: job_id,
            name: "Nightly Orders".to_string(),
            source_id,
            destination_id,
            encryption_profile_id: None,
            compression,
            cron_expression: "0 0 * * *".to_string(),
            enabled: true,
            retention: RetentionPolicy::None,
            notification_channel_ids: vec![],
            notification_condition: NotificationCondition::Always,
        };
        let source = Source {
            id: source_id,
            name: "orders-db".to_string(),
            kind: DatabaseKind::Postgres,
            encrypted_config: vec![],
            detected_version: None,
        };
        let destination = Destination {
            id: destination_id,
            name: "local".to_string(),
            kind: StorageKind::LocalFs,
            encrypted_config: vec![],
        };
        let execution = Execution::new_queued(job_id, ExecutionKind::Backup);
        RunnerContext {
            job,
            source,
            destination,
            profile: None,
            execution,
            reporter: CompositeReporter {
                first: backhaul_protocol::BufferingReporter::new(),
                second: backhaul_protocol::TracingReporter::new(),
            },
            secret_store,
            cancel: backhaul_protocol::CancellationToken::new(),
            temp_path: None,
            remote_path: None,
            bytes: None,
            databases_label: None,
        }
    }

    #[test]
    fn append_extension_keeps_original_suffix() {
        let path = PathBuf::from("/tmp/dump.sql");
        assert_eq!(append_extension(&path, "gz"), PathBuf::from("/tmp/dump.sql.gz"));
    }

    #[test]
    fn strip_extension_peels_one_suffix() {
        let path = PathBuf::from("/tmp/dump.sql.gz.enc");
        assert_eq!(strip_extension(&path), PathBuf::from("/tmp/dump.sql.gz"));
    }

    #[tokio::test]
    async fn compress_in_place_replaces_temp_path_and_shrinks_repetitive_input() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("dump.sql");
        let original = b"orders backup line\n".repeat(500);
        std::fs::File::create(&dump_path).unwrap().write_all(&original).unwrap();

        let secret_store = SecretStore::new([3u8; 32]);
        let mut ctx = test_context(&secret_store, CompressionKind::Gzip);
        ctx.temp_path = Some(dump_path.clone());

        compress_in_place(&mut ctx, CompressionKind::Gzip, false).await.unwrap();

        let compressed_path = ctx.temp_path.clone().unwrap();
        assert_eq!(compressed_path, append_extension(&dump_path, "gz"));
        assert!(!dump_path.exists());
        assert!(std::fs::metadata(&compressed_path).unwrap().len() < original.len() as u64);
    }

    #[tokio::test]
    async fn compress_in_place_is_a_no_op_when_already_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("dump.dump");
        std::fs::File::create(&dump_path).unwrap().write_all(b"custom-format bytes").unwrap();

        let secret_store = SecretStore::new([3u8; 32]);
        let mut ctx = test_context(&secret_store, CompressionKind::Gzip);
        ctx.temp_path = Some(dump_path.clone());

        compress_in_place(&mut ctx, CompressionKind::Gzip, true).await.unwrap();
        assert_eq!(ctx.temp_path, Some(dump_path));
    }
}
