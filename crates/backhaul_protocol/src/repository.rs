//! The configuration/execution repository contract (spec §5: "the
//! configuration store is the single source of truth; written
//! transactionally; read freely"). `backhaul_store` implements this;
//! `backhaul_runner` and `backhaul_scheduler` depend only on the trait so
//! neither needs to know the concrete storage engine.

use async_trait::async_trait;

use crate::error::BackhaulError;
use crate::execution::Execution;
use crate::ids::{ChannelId, DestinationId, ExecutionId, JobId, ProfileId, SourceId};
use crate::model::{Channel, Destination, EncryptionProfile, Job, Source};

/// Read access to job configuration and its relations, used by the Runner
/// to resolve a job before executing it and by the Scheduler to rebuild
/// its cron table.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get_job(&self, id: JobId) -> Result<Job, BackhaulError>;
    async fn get_source(&self, id: SourceId) -> Result<Source, BackhaulError>;
    async fn get_destination(&self, id: DestinationId) -> Result<Destination, BackhaulError>;
    async fn get_encryption_profile(&self, id: ProfileId) -> Result<EncryptionProfile, BackhaulError>;
    async fn get_channels(&self, ids: &[ChannelId]) -> Result<Vec<Channel>, BackhaulError>;
    /// Every enabled job, for the scheduler's cron table rebuild on boot
    /// and on `reload()`.
    async fn list_enabled_jobs(&self) -> Result<Vec<Job>, BackhaulError>;
}

/// Execution persistence (spec §4.7): append-only in spirit, ordered
/// retrieval by `startedAt desc`, indexed lookup by job and status.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn insert_execution(&self, execution: &Execution) -> Result<(), BackhaulError>;
    async fn update_execution(&self, execution: &Execution) -> Result<(), BackhaulError>;
    async fn get_execution(&self, id: ExecutionId) -> Result<Execution, BackhaulError>;
    async fn list_executions_for_job(&self, job_id: JobId) -> Result<Vec<Execution>, BackhaulError>;
    /// True if another execution of this job is currently `Running` (spec
    /// §8 invariant: at most one `Running` execution per job).
    async fn has_running_execution(&self, job_id: JobId) -> Result<bool, BackhaulError>;
}
