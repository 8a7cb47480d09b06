//! The restore pipeline (spec §4.5 mirror): resolve, download, [decrypt,
//! decompress], prepare target, restore subprocess, finalize.

use std::collections::HashMap;

use backhaul_db::{DatabaseAdapter, DatabaseMapping, PrivilegedAuth};
use backhaul_protocol::{
    naming, BackhaulError, CancellationToken, CompositeReporter, CompressionKind, ErrorKind,
    Execution, ExecutionId, ExecutionKind, ExecutionRepository, JobId, JobRepository, LogLevel,
    LogType, Sidecar,
};
use backhaul_security::SecretStore;
use backhaul_storage::StorageAdapter;

use crate::context::RunnerContext;
use crate::pipeline::{decompress_to, strip_extension};

/// What to restore: a job's source/destination pair, a specific artifact
/// already uploaded under that job, and the per-database rename/filter
/// mapping a multi-database restore needs.
pub struct RestoreRequest {
    pub job_id: JobId,
    pub remote_artifact_path: String,
    pub mapping: Option<HashMap<String, DatabaseMapping>>,
    pub privileged_auth: Option<PrivilegedAuth>,
    /// Pre-allocated id for callers that need to hand it back before the
    /// run finishes (the scheduler's manual-trigger path); `None` mints a
    /// fresh one.
    pub execution_id: Option<ExecutionId>,
}

pub async fn run_restore(
    request: RestoreRequest,
    job_repo: &dyn JobRepository,
    execution_repo: &dyn ExecutionRepository,
    secret_store: &SecretStore,
    cancel: CancellationToken,
) -> Result<Execution, BackhaulError> {
    let job = job_repo.get_job(request.job_id).await?;
    let source = job_repo.get_source(job.source_id).await?;
    let destination = job_repo.get_destination(job.destination_id).await?;
    let profile = match job.encryption_profile_id {
        Some(id) => Some(job_repo.get_encryption_profile(id).await?),
        None => None,
    };

    let mut execution = Execution::new_queued(request.job_id, ExecutionKind::Restore);
    if let Some(id) = request.execution_id {
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
        remote_path: Some(request.remote_artifact_path.clone()),
        bytes: None,
        databases_label: None,
    };

    let outcome = run_stages(&mut ctx, &request).await;
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

async fn run_stages(ctx: &mut RunnerContext<'_>, request: &RestoreRequest) -> Result<(), BackhaulError> {
    ctx.log(
        LogLevel::Info,
        LogType::Resolve,
        format!("resolving restore target '{}' from {}", ctx.source.name, request.remote_artifact_path),
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

    let sidecar_remote = naming::sidecar_path(&request.remote_artifact_path);
    let sidecar: Option<Sidecar> = match dest_adapter.read(&sidecar_remote).await? {
        Some(text) => Some(
            serde_json::from_str(&text)
                .map_err(|err| BackhaulError::integrity(format!("sidecar is not valid JSON: {err}")))?,
        ),
        None => None,
    };

    let temp_dir = std::env::temp_dir().join("backhaul");
    tokio::fs::create_dir_all(&temp_dir).await?;
    let downloaded_name = request
        .remote_artifact_path
        .rsplit('/')
        .next()
        .unwrap_or("restore.tmp")
        .to_string();
    let downloaded_path = temp_dir.join(format!("restore_{}_{downloaded_name}", ctx.execution.id));
    ctx.temp_path = Some(downloaded_path.clone());

    ctx.log(LogLevel::Info, LogType::Dump, format!("downloading {}", request.remote_artifact_path));
    dest_adapter.download(&request.remote_artifact_path, &downloaded_path).await?;
    ctx.progress(0.4, "download");
    check_cancelled(ctx)?;

    let mut current_path = downloaded_path;

    if let Some(encryption) = sidecar.as_ref().and_then(|s| s.encryption.as_ref()) {
        let profile = ctx
            .profile
            .clone()
            .filter(|p| p.id == encryption.profile_id)
            .ok_or_else(|| BackhaulError::config_invalid("artifact was encrypted with an unknown profile"))?;
        let data_key = ctx.secret_store.unwrap_data_key(&profile.wrapped_key)?;
        let iv = hex::decode(&encryption.iv)
            .map_err(|err| BackhaulError::integrity(format!("sidecar iv is not valid hex: {err}")))?;
        let auth_tag = hex::decode(&encryption.auth_tag)
            .map_err(|err| BackhaulError::integrity(format!("sidecar auth tag is not valid hex: {err}")))?;

        let decrypted_path = strip_extension(&current_path);
        ctx.log(LogLevel::Info, LogType::Transform, "decrypting artifact");
        let input_path = current_path.clone();
        let output_path = decrypted_path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), BackhaulError> {
            let input = std::fs::File::open(&input_path)?;
            let output = std::fs::File::create(&output_path)?;
            backhaul_codec::decrypt_stream(input, output, &data_key, &iv, &auth_tag)?;
            Ok(())
        })
        .await
        .map_err(|err| BackhaulError::internal(format!("decryption task panicked: {err}")))??;

        tokio::fs::remove_file(&current_path).await?;
        current_path = decrypted_path;
        ctx.temp_path = Some(current_path.clone());
    }
    check_cancelled(ctx)?;

    if let Some(label) = sidecar.as_ref().and_then(|s| s.compression.as_deref()) {
        let compression = match label {
            "gzip" => CompressionKind::Gzip,
            "brotli" => CompressionKind::Brotli,
            _ => CompressionKind::None,
        };
        if compression != CompressionKind::None {
            let decompressed_path = strip_extension(&current_path);
            ctx.log(LogLevel::Info, LogType::Transform, "decompressing artifact");
            decompress_to(current_path.clone(), decompressed_path.clone(), compression).await?;
            tokio::fs::remove_file(&current_path).await?;
            current_path = decompressed_path;
            ctx.temp_path = Some(current_path.clone());
        }
    }
    check_cancelled(ctx)?;

    ctx.log(LogLevel::Info, LogType::Resolve, "probing write capability before restore");
    prepare_restore(source_adapter.as_ref()).await?;
    check_cancelled(ctx)?;

    ctx.log(LogLevel::Info, LogType::Dump, "restoring dump into target database(s)");
    let restore_result = source_adapter
        .restore(
            &current_path,
            request.mapping.as_ref(),
            request.privileged_auth.as_ref(),
            &ctx.cancel,
            &ctx.reporter,
        )
        .await?;
    if !restore_result.ok {
        return Err(BackhaulError::internal(
            restore_result.error.unwrap_or_else(|| "restore reported failure with no message".to_string()),
        ));
    }
    ctx.bytes = restore_result.bytes_written;
    ctx.progress(0.95, "restore");

    Ok(())
}

/// A write-capability probe ahead of the restore subprocess (spec §4.5).
/// Target database creation itself happens inside `restore()` when
/// privileged credentials are supplied; this stage only confirms the
/// configured credentials can reach the server at all.
async fn prepare_restore(adapter: &dyn DatabaseAdapter) -> Result<(), BackhaulError> {
    let probe = adapter.test().await?;
    if !probe.ok {
        return Err(BackhaulError::new(ErrorKind::AuthDenied, probe.message));
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
            ctx.log(LogLevel::Info, LogType::Finalize, "restore finished successfully");
            ctx.execution.mark_success(bytes);
        }
        Err(err) if ctx.cancel.is_cancelled() => {
            ctx.log(LogLevel::Warn, LogType::Finalize, "restore cancelled");
            let _ = err;
            ctx.execution.mark_cancelled();
        }
        Err(err) => {
            ctx.log(LogLevel::Error, LogType::Finalize, format!("restore failed: {}", err.message));
            ctx.execution.mark_failed(err);
        }
    }
    ctx.progress(1.0, "finalize");
    ctx.drain_logs_into_execution();
}
