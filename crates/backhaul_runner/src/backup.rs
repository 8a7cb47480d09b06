//! The backup pipeline (spec §4.5): resolve, dump, transform, upload,
//! sidecar, retention, finalize. Any stage error jumps straight to
//! Finalize; the temp file is always removed there, win or lose.

use backhaul_protocol::{
    naming, Artifact, BackhaulError, CancellationToken, CompositeReporter, CompressionKind,
    DatabasesLabel, Execution, ExecutionId, ExecutionKind, ExecutionRepository, JobId,
    JobRepository, LogLevel, LogType, RetentionPolicy, Sidecar, SidecarEncryption,
};
use backhaul_db::DatabaseAdapter;
use backhaul_security::SecretStore;
use backhaul_storage::StorageAdapter;
use chrono::Utc;

use crate::context::RunnerContext;
use crate::pipeline::{
    append_extension, compress_in_place, dump_already_compressed, dump_extension, WEIGHT_DUMP,
    WEIGHT_RETENTION, WEIGHT_UPLOAD,
};

/// Runs one backup of `job_id` to completion, persisting the execution row
/// before the run starts and again after it finishes, regardless of
/// outcome.
///
/// `execution_id` lets a caller (the scheduler's manual-trigger path) mint
/// the id up front and hand it back to the operator before the run
/// finishes; cron-fired runs pass `None` and get a fresh one.
pub async fn run_backup(
    job_id: JobId,
    execution_id: Option<ExecutionId>,
    job_repo: &dyn JobRepository,
    execution_repo: &dyn ExecutionRepository,
    secret_store: &SecretStore,
    cancel: CancellationToken,
) -> Result<Execution, BackhaulError> {
    let job = job_repo.get_job(job_id).await?;
    let source = job_repo.get_source(job.source_id).await?;
    let destination = job_repo.get_destination(job.destination_id).await?;
    let profile = match job.encryption_profile_id {
        Some(id) => Some(job_repo.get_encryption_profile(id).await?),
        None => None,
    };

    if execution_repo.has_running_execution(job_id).await? {
        return Err(BackhaulError::config_invalid(
            "a Running execution already exists for this job",
        ));
    }

    let mut execution = Execution::new_queued(job_id, ExecutionKind::Backup);
    if let Some(id) = execution_id {
        execution.id = id;
    }
    execution.mark_running();
    execution_repo.insert_execution(&execution).await?;

    let mut ctx = RunnerContext {
        job,
        source,
        destination,
        profile,
        execution,
        reporter: CompositeReporter {
            first: backhaul_protocol::BufferingReporter::new(),
            second: backhaul_protocol::TracingReporter::new(),
        },
        secret_store,
        cancel,
        temp_path: None,
        remote_path: None,
        bytes: None,
        databases_label: None,
    };

    let outcome = run_stages(&mut ctx).await;
    finalize(&mut ctx, outcome).await;

    execution_repo.update_execution(&ctx.execution).await?;
    Ok(ctx.execution)
}

fn check_cancelled(ctx: &RunnerContext<'_>) -> Result<(), BackhaulError> {
    if ctx.cancel.is_cancelled() {
        Err(BackhaulError::cancelled("cancelled between stages"))
    } else {
        Ok(())
    }
}

async fn run_stages(ctx: &mut RunnerContext<'_>) -> Result<(), BackhaulError> {
    ctx.log(
        LogLevel::Info,
        LogType::Resolve,
        format!(
            "resolving source '{}' and destination '{}'",
            ctx.source.name, ctx.destination.name
        ),
    );

    let source_config = ctx.secret_store.decrypt(&ctx.source.encrypted_config)?;
    let source_config_json = std::str::from_utf8(source_config.as_slice())
        .map_err(|err| BackhaulError::config_invalid(format!("source config is not valid utf-8: {err}")))?;
    let source_adapter = backhaul_db::build_adapter(ctx.source.kind, source_config_json)?;

    let dest_config = ctx.secret_store.decrypt(&ctx.destination.encrypted_config)?;
    let dest_config_json = std::str::from_utf8(dest_config.as_slice())
        .map_err(|err| BackhaulError::config_invalid(format!("destination config is not valid utf-8: {err}")))?;
    let dest_adapter = backhaul_storage::build_adapter(ctx.destination.kind, dest_config_json).await?;

    ctx.progress(0.0, "resolve");
    check_cancelled(ctx)?;

    let temp_dir = std::env::temp_dir().join("backhaul");
    tokio::fs::create_dir_all(&temp_dir).await?;
    let basename = naming::temp_file_name(&ctx.job.name, ctx.execution.started_at, dump_extension(ctx.source.kind));
    let temp_path = temp_dir.join(&basename);
    ctx.temp_path = Some(temp_path.clone());

    ctx.log(
        LogLevel::Info,
        LogType::Dump,
        format!("dumping {} to {}", ctx.source.name, temp_path.display()),
    );
    let dump_result = source_adapter.dump(&temp_path, &ctx.cancel, &ctx.reporter).await?;
    if !dump_result.ok {
        return Err(BackhaulError::internal(
            dump_result.error.unwrap_or_else(|| "dump reported failure with no message".to_string()),
        ));
    }
    ctx.bytes = Some(dump_result.bytes_written.unwrap_or(0));
    ctx.databases_label = Some(databases_label_from_config(source_config_json));
    ctx.progress(WEIGHT_DUMP, "dump");
    check_cancelled(ctx)?;

    let already_compressed = dump_already_compressed(ctx.source.kind);
    compress_in_place(ctx, ctx.job.compression, already_compressed).await?;
    check_cancelled(ctx)?;

    let mut encryption_meta: Option<SidecarEncryption> = None;
    if let Some(profile) = ctx.profile.clone() {
        let data_key = ctx.secret_store.unwrap_data_key(&profile.wrapped_key)?;
        let current = ctx.temp_path.clone().expect("dump stage always sets temp_path");
        let encrypted_path = append_extension(&current, "enc");
        let original_name = current.file_name().unwrap_or_default().to_string_lossy().into_owned();

        ctx.log(LogLevel::Info, LogType::Transform, "encrypting dump");
        let current_for_blocking = current.clone();
        let encrypted_for_blocking = encrypted_path.clone();
        let trailer = tokio::task::spawn_blocking(move || -> Result<backhaul_codec::EncryptionTrailer, BackhaulError> {
            let input = std::fs::File::open(&current_for_blocking)?;
            let output = std::fs::File::create(&encrypted_for_blocking)?;
            Ok(backhaul_codec::encrypt_stream(input, output, &data_key)?)
        })
        .await
        .map_err(|err| BackhaulError::internal(format!("encryption task panicked: {err}")))??;

        tokio::fs::remove_file(&current).await?;
        ctx.temp_path = Some(encrypted_path);
        encryption_meta = Some(SidecarEncryption {
            profile_id: profile.id,
            iv: hex::encode(trailer.iv),
            auth_tag: hex::encode(trailer.auth_tag),
            original_name,
        });
    }
    check_cancelled(ctx)?;

    let final_path = ctx.temp_path.clone().expect("dump stage always sets temp_path");
    let final_name = final_path.file_name().unwrap_or_default().to_string_lossy().into_owned();
    let remote_path = naming::remote_artifact_path(&ctx.job.name, &final_name);
    let artifact_bytes = tokio::fs::metadata(&final_path).await?.len();
    ctx.bytes = Some(artifact_bytes);

    ctx.log(LogLevel::Info, LogType::Upload, format!("uploading to {remote_path}"));
    dest_adapter.upload(&final_path, &remote_path).await?;
    ctx.remote_path = Some(remote_path.clone());
    ctx.progress(WEIGHT_DUMP + WEIGHT_UPLOAD, "upload");
    check_cancelled(ctx)?;

    let sidecar = Sidecar {
        job_name: ctx.job.name.clone(),
        source_name: ctx.source.name.clone(),
        source_type: ctx.source.kind.as_str().to_string(),
        databases: ctx
            .databases_label
            .clone()
            .unwrap_or(DatabasesLabel { count: 1, label: "Unknown".to_string() }),
        locked: None,
        encryption: encryption_meta,
        compression: if ctx.job.compression == CompressionKind::None || already_compressed {
            None
        } else {
            Some(compression_label(ctx.job.compression))
        },
        created_at: Utc::now(),
    };
    let sidecar_json = serde_json::to_vec(&sidecar)
        .map_err(|err| BackhaulError::internal(format!("sidecar serialization failed: {err}")))?;
    let sidecar_temp = temp_dir.join(format!("{final_name}.meta.json"));
    tokio::fs::write(&sidecar_temp, &sidecar_json).await?;
    let sidecar_remote = naming::sidecar_path(&remote_path);
    ctx.log(LogLevel::Info, LogType::Sidecar, format!("writing sidecar to {sidecar_remote}"));
    dest_adapter.upload(&sidecar_temp, &sidecar_remote).await?;
    tokio::fs::remove_file(&sidecar_temp).await?;
    check_cancelled(ctx)?;

    ctx.log(LogLevel::Info, LogType::Retention, "applying retention policy");
    apply_retention(ctx, dest_adapter.as_ref()).await?;
    ctx.progress(WEIGHT_DUMP + WEIGHT_UPLOAD + WEIGHT_RETENTION, "retention");

    Ok(())
}

/// Every dialect's config carries a `selected_databases` list with the same
/// convention (spec §4.5 step 2): empty means "all databases". Parsed
/// generically off the raw config JSON rather than the typed per-dialect
/// config struct, since the label only ever needs this one field regardless
/// of source kind.
#[derive(serde::Deserialize)]
struct SelectedDatabases {
    #[serde(default)]
    selected_databases: Vec<String>,
}

fn databases_label_from_config(source_config_json: &str) -> DatabasesLabel {
    let selected = serde_json::from_str::<SelectedDatabases>(source_config_json)
        .map(|config| config.selected_databases)
        .unwrap_or_default();

    if selected.is_empty() {
        DatabasesLabel {
            count: 0,
            label: naming::databases_label(None, true),
        }
    } else {
        let count = selected.len() as u32;
        DatabasesLabel {
            count,
            label: naming::databases_label(Some(count), false),
        }
    }
}

fn compression_label(kind: CompressionKind) -> String {
    match kind {
        CompressionKind::None => "none",
        CompressionKind::Gzip => "gzip",
        CompressionKind::Brotli => "brotli",
    }
    .to_string()
}

async fn apply_retention(
    ctx: &mut RunnerContext<'_>,
    dest_adapter: &dyn StorageAdapter,
) -> Result<(), BackhaulError> {
    if matches!(ctx.job.retention, RetentionPolicy::None) {
        return Ok(());
    }
    let dir = naming::remote_job_dir(&ctx.job.name);
    let entries = dest_adapter.list(&dir).await?;
    let mut artifacts = Vec::new();
    for entry in entries {
        if entry.path.ends_with(".meta.json") {
            continue;
        }
        let sidecar_remote = naming::sidecar_path(&entry.path);
        let sidecar = match dest_adapter.read(&sidecar_remote).await? {
            Some(text) => serde_json::from_str(&text).ok(),
            None => None,
        };
        artifacts.push(Artifact {
            remote_path: entry.path,
            size_bytes: entry.size,
            last_modified: entry.last_modified,
            sidecar,
        });
    }

    let retention_plan = backhaul_retention::plan(&artifacts, &ctx.job.retention, Utc::now());
    for artifact in retention_plan.delete() {
        ctx.log(
            LogLevel::Info,
            LogType::Retention,
            format!("deleting {} per retention policy", artifact.remote_path),
        );
        dest_adapter.delete(&artifact.remote_path).await?;
        dest_adapter.delete(&naming::sidecar_path(&artifact.remote_path)).await?;
    }
    Ok(())
}

async fn finalize(ctx: &mut RunnerContext<'_>, outcome: Result<(), BackhaulError>) {
    if let Some(temp_path) = ctx.temp_path.take() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }

    match outcome {
        Ok(()) => {
            let bytes = ctx.bytes.unwrap_or(0);
            ctx.log(LogLevel::Info, LogType::Finalize, "backup finished successfully");
            ctx.execution.mark_success(bytes);
        }
        Err(err) if ctx.cancel.is_cancelled() => {
            ctx.log(LogLevel::Warn, LogType::Finalize, "backup cancelled");
            let _ = err;
            ctx.execution.mark_cancelled();
        }
        Err(err) => {
            ctx.log(LogLevel::Error, LogType::Finalize, format!("backup failed: {}", err.message));
            ctx.execution.mark_failed(err);
        }
    }
    ctx.progress(1.0, "finalize");
    ctx.drain_logs_into_execution();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_label_matches_sidecar_vocabulary() {
        assert_eq!(compression_label(CompressionKind::Gzip), "gzip");
        assert_eq!(compression_label(CompressionKind::Brotli), "brotli");
    }

    #[test]
    fn dump_extension_matches_dialect_output() {
        use backhaul_protocol::DatabaseKind;
        assert_eq!(dump_extension(DatabaseKind::Postgres), "dump");
        assert_eq!(dump_extension(DatabaseKind::Mysql), "sql");
        assert_eq!(dump_extension(DatabaseKind::Mongo), "archive");
        assert_eq!(dump_extension(DatabaseKind::Mssql), "bak");
    }
}
