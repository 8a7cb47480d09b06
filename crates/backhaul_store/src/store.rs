//! `Store`: a single `SqlitePool`-backed type implementing both
//! [`JobRepository`] and [`ExecutionRepository`] (spec §5: the
//! configuration store is the single source of truth, written
//! transactionally, read freely; spec §4.7: executions persist one row per
//! run). Enum/struct-valued columns round-trip through JSON text; entity
//! IDs round-trip through their `Display`/`FromStr` impls.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use backhaul_protocol::{
    BackhaulError, Channel, ChannelId, Destination, DestinationId, EncryptionProfile, Execution,
    ExecutionId, ExecutionRepository, Job, JobId, JobRepository, ProfileId, Source, SourceId,
};

use crate::error::StoreError;

/// The concrete configuration/execution store.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_source(&self, source: &Source) -> Result<(), StoreError> {
        let kind_json = serde_json::to_string(&source.kind)?;
        sqlx::query(
            r#"
            INSERT INTO sources (id, name, kind, encrypted_config, detected_version)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                encrypted_config = excluded.encrypted_config,
                detected_version = excluded.detected_version
            "#,
        )
        .bind(source.id.to_string())
        .bind(&source.name)
        .bind(kind_json)
        .bind(&source.encrypted_config)
        .bind(&source.detected_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_destination(&self, destination: &Destination) -> Result<(), StoreError> {
        let kind_json = serde_json::to_string(&destination.kind)?;
        sqlx::query(
            r#"
            INSERT INTO destinations (id, name, kind, encrypted_config)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                encrypted_config = excluded.encrypted_config
            "#,
        )
        .bind(destination.id.to_string())
        .bind(&destination.name)
        .bind(kind_json)
        .bind(&destination.encrypted_config)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_channel(&self, channel: &Channel) -> Result<(), StoreError> {
        let kind_json = serde_json::to_string(&channel.kind)?;
        sqlx::query(
            r#"
            INSERT INTO channels (id, name, kind, encrypted_config)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                encrypted_config = excluded.encrypted_config
            "#,
        )
        .bind(channel.id.to_string())
        .bind(&channel.name)
        .bind(kind_json)
        .bind(&channel.encrypted_config)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_encryption_profile(&self, profile: &EncryptionProfile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO encryption_profiles (id, name, description, wrapped_key)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                wrapped_key = excluded.wrapped_key
            "#,
        )
        .bind(profile.id.to_string())
        .bind(&profile.name)
        .bind(&profile.description)
        .bind(&profile.wrapped_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let compression_json = serde_json::to_string(&job.compression)?;
        let retention_json = serde_json::to_string(&job.retention)?;
        let channel_ids_json = serde_json::to_string(&job.notification_channel_ids)?;
        let condition_json = serde_json::to_string(&job.notification_condition)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, name, source_id, destination_id, encryption_profile_id, compression,
                cron_expression, enabled, retention, notification_channel_ids, notification_condition
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                source_id = excluded.source_id,
                destination_id = excluded.destination_id,
                encryption_profile_id = excluded.encryption_profile_id,
                compression = excluded.compression,
                cron_expression = excluded.cron_expression,
                enabled = excluded.enabled,
                retention = excluded.retention,
                notification_channel_ids = excluded.notification_channel_ids,
                notification_condition = excluded.notification_condition
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.name)
        .bind(job.source_id.to_string())
        .bind(job.destination_id.to_string())
        .bind(job.encryption_profile_id.map(|id| id.to_string()))
        .bind(compression_json)
        .bind(&job.cron_expression)
        .bind(job.enabled)
        .bind(retention_json)
        .bind(channel_ids_json)
        .bind(condition_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_source(row: &sqlx::sqlite::SqliteRow) -> Result<Source, StoreError> {
        let id: String = row.get("id");
        let kind_json: String = row.get("kind");
        Ok(Source {
            id: SourceId::from_str(&id).map_err(|e| StoreError::corrupt_row(e.to_string()))?,
            name: row.get("name"),
            kind: serde_json::from_str(&kind_json)?,
            encrypted_config: row.get("encrypted_config"),
            detected_version: row.get("detected_version"),
        })
    }

    fn row_to_destination(row: &sqlx::sqlite::SqliteRow) -> Result<Destination, StoreError> {
        let id: String = row.get("id");
        let kind_json: String = row.get("kind");
        Ok(Destination {
            id: DestinationId::from_str(&id).map_err(|e| StoreError::corrupt_row(e.to_string()))?,
            name: row.get("name"),
            kind: serde_json::from_str(&kind_json)?,
            encrypted_config: row.get("encrypted_config"),
        })
    }

    fn row_to_channel(row: &sqlx::sqlite::SqliteRow) -> Result<Channel, StoreError> {
        let id: String = row.get("id");
        let kind_json: String = row.get("kind");
        Ok(Channel {
            id: ChannelId::from_str(&id).map_err(|e| StoreError::corrupt_row(e.to_string()))?,
            name: row.get("name"),
            kind: serde_json::from_str(&kind_json)?,
            encrypted_config: row.get("encrypted_config"),
        })
    }

    fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<EncryptionProfile, StoreError> {
        let id: String = row.get("id");
        Ok(EncryptionProfile {
            id: ProfileId::from_str(&id).map_err(|e| StoreError::corrupt_row(e.to_string()))?,
            name: row.get("name"),
            description: row.get("description"),
            wrapped_key: row.get("wrapped_key"),
        })
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job, StoreError> {
        let id: String = row.get("id");
        let source_id: String = row.get("source_id");
        let destination_id: String = row.get("destination_id");
        let profile_id: Option<String> = row.get("encryption_profile_id");
        let compression_json: String = row.get("compression");
        let retention_json: String = row.get("retention");
        let channel_ids_json: String = row.get("notification_channel_ids");
        let condition_json: String = row.get("notification_condition");

        Ok(Job {
            id: JobId::from_str(&id).map_err(|e| StoreError::corrupt_row(e.to_string()))?,
            name: row.get("name"),
            source_id: SourceId::from_str(&source_id).map_err(|e| StoreError::corrupt_row(e.to_string()))?,
            destination_id: DestinationId::from_str(&destination_id)
                .map_err(|e| StoreError::corrupt_row(e.to_string()))?,
            encryption_profile_id: profile_id
                .map(|id| ProfileId::from_str(&id))
                .transpose()
                .map_err(|e| StoreError::corrupt_row(e.to_string()))?,
            compression: serde_json::from_str(&compression_json)?,
            cron_expression: row.get("cron_expression"),
            enabled: row.get("enabled"),
            retention: serde_json::from_str(&retention_json)?,
            notification_channel_ids: serde_json::from_str(&channel_ids_json)?,
            notification_condition: serde_json::from_str(&condition_json)?,
        })
    }

    fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> Result<Execution, StoreError> {
        let id: String = row.get("id");
        let job_id: String = row.get("job_id");
        let kind_json: String = row.get("kind");
        let status_json: String = row.get("status");
        let error_json: Option<String> = row.get("error");
        let logs_json: String = row.get("logs");

        Ok(Execution {
            id: ExecutionId::from_str(&id).map_err(|e| StoreError::corrupt_row(e.to_string()))?,
            job_id: JobId::from_str(&job_id).map_err(|e| StoreError::corrupt_row(e.to_string()))?,
            kind: serde_json::from_str(&kind_json)?,
            status: serde_json::from_str(&status_json)?,
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            progress: row.get::<f64, _>("progress") as f32,
            artifact_size_bytes: row.get::<Option<i64>, _>("artifact_size_bytes").map(|v| v as u64),
            error: error_json.map(|text| serde_json::from_str(&text)).transpose()?,
            logs: serde_json::from_str(&logs_json)?,
        })
    }
}

#[async_trait]
impl JobRepository for Store {
    async fn get_job(&self, id: JobId) -> Result<Job, BackhaulError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        match row {
            Some(row) => Ok(Self::row_to_job(&row)?),
            None => Err(StoreError::not_found(format!("job {id} not found")).into()),
        }
    }

    async fn get_source(&self, id: SourceId) -> Result<Source, BackhaulError> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        match row {
            Some(row) => Ok(Self::row_to_source(&row)?),
            None => Err(StoreError::not_found(format!("source {id} not found")).into()),
        }
    }

    async fn get_destination(&self, id: DestinationId) -> Result<Destination, BackhaulError> {
        let row = sqlx::query("SELECT * FROM destinations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        match row {
            Some(row) => Ok(Self::row_to_destination(&row)?),
            None => Err(StoreError::not_found(format!("destination {id} not found")).into()),
        }
    }

    async fn get_encryption_profile(&self, id: ProfileId) -> Result<EncryptionProfile, BackhaulError> {
        let row = sqlx::query("SELECT * FROM encryption_profiles WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        match row {
            Some(row) => Ok(Self::row_to_profile(&row)?),
            None => Err(StoreError::not_found(format!("encryption profile {id} not found")).into()),
        }
    }

    async fn get_channels(&self, ids: &[ChannelId]) -> Result<Vec<Channel>, BackhaulError> {
        let mut channels = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query("SELECT * FROM channels WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)?;
            match row {
                Some(row) => channels.push(Self::row_to_channel(&row).map_err(BackhaulError::from)?),
                None => return Err(StoreError::not_found(format!("channel {id} not found")).into()),
            }
        }
        Ok(channels)
    }

    async fn list_enabled_jobs(&self) -> Result<Vec<Job>, BackhaulError> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE enabled = 1 ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.iter()
            .map(|row| Self::row_to_job(row).map_err(BackhaulError::from))
            .collect()
    }
}

#[async_trait]
impl ExecutionRepository for Store {
    async fn insert_execution(&self, execution: &Execution) -> Result<(), BackhaulError> {
        let kind_json = serde_json::to_string(&execution.kind).map_err(StoreError::from)?;
        let status_json = serde_json::to_string(&execution.status).map_err(StoreError::from)?;
        let error_json = execution
            .error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StoreError::from)?;
        let logs_json = serde_json::to_string(&execution.logs).map_err(StoreError::from)?;

        sqlx::query(
            r#"
            INSERT INTO executions (
                id, job_id, kind, status, started_at, finished_at, progress,
                artifact_size_bytes, error, logs
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.job_id.to_string())
        .bind(kind_json)
        .bind(status_json)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(execution.progress as f64)
        .bind(execution.artifact_size_bytes.map(|v| v as i64))
        .bind(error_json)
        .bind(logs_json)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn update_execution(&self, execution: &Execution) -> Result<(), BackhaulError> {
        let status_json = serde_json::to_string(&execution.status).map_err(StoreError::from)?;
        let error_json = execution
            .error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StoreError::from)?;
        let logs_json = serde_json::to_string(&execution.logs).map_err(StoreError::from)?;

        let result = sqlx::query(
            r#"
            UPDATE executions SET
                status = ?, finished_at = ?, progress = ?, artifact_size_bytes = ?, error = ?, logs = ?
            WHERE id = ?
            "#,
        )
        .bind(status_json)
        .bind(execution.finished_at)
        .bind(execution.progress as f64)
        .bind(execution.artifact_size_bytes.map(|v| v as i64))
        .bind(error_json)
        .bind(logs_json)
        .bind(execution.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("execution {} not found", execution.id)).into());
        }
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Execution, BackhaulError> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        match row {
            Some(row) => Ok(Self::row_to_execution(&row)?),
            None => Err(StoreError::not_found(format!("execution {id} not found")).into()),
        }
    }

    async fn list_executions_for_job(&self, job_id: JobId) -> Result<Vec<Execution>, BackhaulError> {
        let rows = sqlx::query("SELECT * FROM executions WHERE job_id = ? ORDER BY started_at DESC")
            .bind(job_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.iter()
            .map(|row| Self::row_to_execution(row).map_err(BackhaulError::from))
            .collect()
    }

    async fn has_running_execution(&self, job_id: JobId) -> Result<bool, BackhaulError> {
        let running_status = serde_json::to_string(&backhaul_protocol::ExecutionStatus::Running)
            .map_err(StoreError::from)?;
        let row = sqlx::query("SELECT count(*) as count FROM executions WHERE job_id = ? AND status = ?")
            .bind(job_id.to_string())
            .bind(running_status)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }
}
