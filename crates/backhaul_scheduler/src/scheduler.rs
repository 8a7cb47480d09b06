//! The scheduler coordinator (spec §4.6): cron evaluation, per-job
//! mutual exclusion, a global concurrency slot, and the manual-trigger
//! path. All state lives in process memory; only job configuration is
//! persisted, so the scheduler itself is stateless across restarts.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use backhaul_alerts::SnapshotRepository;
use backhaul_notify::Dispatcher;
use backhaul_protocol::{
    BackhaulError, CancellationToken, EventContext, Execution, ExecutionId, ExecutionRepository,
    ExecutionStatus, JobId, JobRepository, NotificationEvent,
};
use backhaul_security::SecretStore;
use backhaul_storage::{build_adapter, capture_snapshot};

use crate::cron_table::CronSpec;
use crate::error::SchedulerError;

/// Snapshot of the manual-trigger queue (spec §4 supplement:
/// `queue_stats()`): runs that have cleared the per-job mutex but are
/// still waiting on a global concurrency slot, versus runs currently
/// executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of backup/restore runs executing at once,
    /// across all jobs (spec §4.6, default 4).
    pub concurrency: usize,
    /// How often the tick loop evaluates the cron table; also the
    /// lookback window used to decide whether a job fired since the
    /// previous tick.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            tick_interval: Duration::minutes(1),
        }
    }
}

pub struct Scheduler {
    job_repo: Arc<dyn JobRepository>,
    execution_repo: Arc<dyn ExecutionRepository>,
    secret_store: Arc<SecretStore>,
    dispatcher: Arc<Dispatcher>,
    snapshots: Arc<dyn SnapshotRepository>,
    config: SchedulerConfig,
    slots: Arc<Semaphore>,
    job_locks: RwLock<HashMap<JobId, Arc<Mutex<()>>>>,
    cron_table: RwLock<HashMap<JobId, CronSpec>>,
    manual_pending: AtomicUsize,
    manual_running: AtomicUsize,
}

impl Scheduler {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        execution_repo: Arc<dyn ExecutionRepository>,
        secret_store: Arc<SecretStore>,
        dispatcher: Arc<Dispatcher>,
        snapshots: Arc<dyn SnapshotRepository>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            job_repo,
            execution_repo,
            secret_store,
            dispatcher,
            snapshots,
            slots: Arc::new(Semaphore::new(config.concurrency.max(1))),
            job_locks: RwLock::new(HashMap::new()),
            cron_table: RwLock::new(HashMap::new()),
            manual_pending: AtomicUsize::new(0),
            manual_running: AtomicUsize::new(0),
            config,
        })
    }

    /// Rebuilds the cron table from persistence. Safe to call while runs
    /// are in flight (spec §4.6 "reload contract"): the table is replaced
    /// atomically, in-flight runs keep their own `Arc<Mutex<()>>` clone,
    /// removed jobs simply stop appearing in future ticks.
    pub async fn reload(&self) -> Result<(), SchedulerError> {
        let jobs = self.job_repo.list_enabled_jobs().await?;

        let mut table = HashMap::with_capacity(jobs.len());
        {
            let mut locks = self.job_locks.write().await;
            for job in &jobs {
                let spec = CronSpec::parse(&job.cron_expression)?;
                locks.entry(job.id).or_insert_with(|| Arc::new(Mutex::new(())));
                table.insert(job.id, spec);
            }
        }

        *self.cron_table.write().await = table;
        Ok(())
    }

    /// Evaluates every job in the cron table against `now` and dispatches
    /// the ones due to fire. Jobs whose previous run is still in progress
    /// are skipped, not queued: a missed tick is simply not replayed
    /// (spec §4.6).
    pub async fn tick(self: &Arc<Self>, now: DateTime<Utc>) {
        let due: Vec<JobId> = {
            let table = self.cron_table.read().await;
            table
                .iter()
                .filter(|(_, spec)| spec.should_fire(now, self.config.tick_interval))
                .map(|(job_id, _)| *job_id)
                .collect()
        };

        for job_id in due {
            let this = Arc::clone(self);
            let outcome = self
                .try_dispatch(job_id, false, move || async move {
                    this.run_scheduled_backup(job_id, None).await;
                })
                .await;

            match outcome {
                Ok(()) => debug!(job_id = %job_id, "tick dispatched job"),
                Err(SchedulerError::Busy(_)) => {
                    debug!(job_id = %job_id, "tick skipped: previous run still in progress")
                }
                Err(err) => warn!(job_id = %job_id, %err, "tick dispatch failed"),
            }
        }
    }

    /// Spawns the periodic tick loop. Returns the task handle so the
    /// caller can abort it on shutdown.
    pub fn spawn_ticker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let period = self
            .config
            .tick_interval
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(60));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                this.tick(Utc::now()).await;
            }
        })
    }

    /// Manual trigger (spec §4.6): enqueues a synthetic execution,
    /// respecting the same mutex and global slot as a cron-fired run.
    /// Mints the execution id up front so it can be returned before the
    /// run finishes (the HTTP-202 pattern at the API boundary).
    pub async fn run_now(self: &Arc<Self>, job_id: JobId) -> Result<ExecutionId, SchedulerError> {
        {
            let table = self.cron_table.read().await;
            if !table.contains_key(&job_id) {
                return Err(SchedulerError::JobNotFound(job_id));
            }
        }

        let execution_id = ExecutionId::new();
        let this = Arc::clone(self);
        self.try_dispatch(job_id, true, move || async move {
            this.run_scheduled_backup(job_id, Some(execution_id)).await;
        })
        .await?;

        Ok(execution_id)
    }

    /// Current manual-trigger queue depth (spec §4 supplement).
    pub fn queue_stats(&self) -> QueueStats {
        QueueStats {
            pending: self.manual_pending.load(Ordering::SeqCst),
            running: self.manual_running.load(Ordering::SeqCst),
        }
    }

    async fn run_scheduled_backup(&self, job_id: JobId, execution_id: Option<ExecutionId>) {
        let cancel = CancellationToken::new();
        let result = backhaul_runner::run_backup(
            job_id,
            execution_id,
            self.job_repo.as_ref(),
            self.execution_repo.as_ref(),
            self.secret_store.as_ref(),
            cancel,
        )
        .await;

        match result {
            Ok(execution) => {
                info!(
                    job_id = %job_id,
                    execution_id = %execution.id,
                    status = ?execution.status,
                    "scheduled run finished"
                );
                self.finalize_notifications_and_snapshot(job_id, &execution).await;
            }
            Err(err) => error!(job_id = %job_id, kind = ?err.kind, message = %err.message, "scheduled run did not complete"),
        }
    }

    /// Finalize's remaining two steps (spec §4.5 step 7), driven from here
    /// rather than the runner itself since the runner cannot depend on
    /// `backhaul-notify`/`backhaul-storage`'s snapshot machinery without
    /// inverting the workspace's dependency direction: emit the job-scoped
    /// outcome notification, then refresh the destination's storage-snapshot
    /// cache in a detached task so a slow storage probe never delays the
    /// run from being considered finished.
    async fn finalize_notifications_and_snapshot(&self, job_id: JobId, execution: &Execution) {
        let job = match self.job_repo.get_job(job_id).await {
            Ok(job) => job,
            Err(err) => {
                warn!(job_id = %job_id, %err, "could not reload job for finalize notification");
                return;
            }
        };

        let event = match execution.status {
            ExecutionStatus::Success => NotificationEvent::BackupSuccess,
            _ => NotificationEvent::BackupFailure,
        };
        let ctx = EventContext {
            job_id: Some(job_id),
            job_name: Some(job.name.clone()),
            user_email: None,
            detail: execution.error.as_ref().map(|err| err.message.clone()),
        };
        self.dispatcher.dispatch_job_event(&job, event, &ctx).await;

        let destination_id = job.destination_id;
        let job_repo = Arc::clone(&self.job_repo);
        let secret_store = Arc::clone(&self.secret_store);
        let snapshots = Arc::clone(&self.snapshots);
        tokio::spawn(async move {
            if let Err(err) = refresh_storage_snapshot(job_repo.as_ref(), secret_store.as_ref(), snapshots.as_ref(), destination_id).await {
                warn!(destination_id = %destination_id, %err, "failed to refresh storage snapshot cache after run");
            }
        });
    }

    /// Acquires the per-job mutex with zero wait, then spawns `work` to
    /// run once a global concurrency slot is free. `manual` controls
    /// whether the run counts toward `queue_stats()`.
    async fn try_dispatch<F, Fut>(
        self: &Arc<Self>,
        job_id: JobId,
        manual: bool,
        work: F,
    ) -> Result<(), SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let lock = self.lock_for(job_id).await;
        let guard = match Arc::clone(&lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => return Err(SchedulerError::Busy(job_id)),
        };

        if manual {
            self.manual_pending.fetch_add(1, Ordering::SeqCst);
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let permit = match Arc::clone(&this.slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    if manual {
                        this.manual_pending.fetch_sub(1, Ordering::SeqCst);
                    }
                    return;
                }
            };

            if manual {
                this.manual_pending.fetch_sub(1, Ordering::SeqCst);
                this.manual_running.fetch_add(1, Ordering::SeqCst);
            }

            work().await;

            if manual {
                this.manual_running.fetch_sub(1, Ordering::SeqCst);
            }

            drop(permit);
            drop(guard);
        });

        Ok(())
    }

    async fn lock_for(&self, job_id: JobId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.job_locks.read().await.get(&job_id) {
            return Arc::clone(lock);
        }
        let mut locks = self.job_locks.write().await;
        Arc::clone(locks.entry(job_id).or_insert_with(|| Arc::new(Mutex::new(()))))
    }
}

/// Captures a fresh [`backhaul_protocol::StorageSnapshot`] for `destination_id`
/// and records it, the same probe the alert loop's timer performs, run here
/// too so a destination's usage history reflects every backup as it
/// finishes rather than only the next periodic tick.
async fn refresh_storage_snapshot(
    job_repo: &dyn JobRepository,
    secret_store: &SecretStore,
    snapshots: &dyn SnapshotRepository,
    destination_id: backhaul_protocol::DestinationId,
) -> Result<(), BackhaulError> {
    let destination = job_repo.get_destination(destination_id).await?;
    let config_bytes = secret_store
        .decrypt(&destination.encrypted_config)
        .map_err(BackhaulError::from)?;
    let config_json = std::str::from_utf8(&config_bytes)
        .map_err(|_| BackhaulError::config_invalid("destination config is not valid utf-8"))?;
    let adapter = build_adapter(destination.kind, config_json)
        .await
        .map_err(BackhaulError::from)?;
    let snapshot = capture_snapshot(adapter.as_ref(), destination_id)
        .await
        .map_err(BackhaulError::from)?;
    snapshots.record_snapshot(&snapshot).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration as StdDuration;

    use backhaul_protocol::{BackhaulError, Execution, ExecutionKind};
    use backhaul_security::SecretStore;

    use super::*;

    fn secret_store() -> Arc<SecretStore> {
        Arc::new(SecretStore::new([7u8; 32]))
    }

    /// A `SnapshotRepository` double that discards everything; these tests
    /// exercise the scheduler's own bookkeeping, not the snapshot cache.
    struct NoopSnapshots;

    #[async_trait::async_trait]
    impl SnapshotRepository for NoopSnapshots {
        async fn record_snapshot(&self, _snapshot: &backhaul_protocol::StorageSnapshot) -> Result<(), BackhaulError> {
            Ok(())
        }
        async fn recent_snapshots(
            &self,
            _destination_id: backhaul_protocol::DestinationId,
            _limit: usize,
        ) -> Result<Vec<backhaul_protocol::StorageSnapshot>, BackhaulError> {
            Ok(Vec::new())
        }
    }

    fn dispatcher(job_repo: Arc<dyn JobRepository>, secret_store: Arc<SecretStore>) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            job_repo,
            secret_store,
            Arc::new(backhaul_notify::HttpNotifySink::new()),
            Arc::new(backhaul_notify::BufferingNotificationLog::default()),
        ))
    }

    /// A `JobRepository`/`ExecutionRepository` double with a single job
    /// whose cron fires every minute; exercises the scheduler's own
    /// bookkeeping without requiring a live database adapter.
    struct NoopRepo;

    #[async_trait::async_trait]
    impl JobRepository for NoopRepo {
        async fn get_job(&self, _id: backhaul_protocol::JobId) -> Result<backhaul_protocol::Job, BackhaulError> {
            Err(BackhaulError::not_found("unused in these tests"))
        }
        async fn get_source(&self, _id: backhaul_protocol::SourceId) -> Result<backhaul_protocol::Source, BackhaulError> {
            Err(BackhaulError::not_found("unused in these tests"))
        }
        async fn get_destination(
            &self,
            _id: backhaul_protocol::DestinationId,
        ) -> Result<backhaul_protocol::Destination, BackhaulError> {
            Err(BackhaulError::not_found("unused in these tests"))
        }
        async fn get_encryption_profile(
            &self,
            _id: backhaul_protocol::ProfileId,
        ) -> Result<backhaul_protocol::EncryptionProfile, BackhaulError> {
            Err(BackhaulError::not_found("unused in these tests"))
        }
        async fn get_channels(&self, _ids: &[backhaul_protocol::ChannelId]) -> Result<Vec<backhaul_protocol::Channel>, BackhaulError> {
            Ok(Vec::new())
        }
        async fn list_enabled_jobs(&self) -> Result<Vec<backhaul_protocol::Job>, BackhaulError> {
            Ok(Vec::new())
        }
    }

    #[async_trait::async_trait]
    impl ExecutionRepository for NoopRepo {
        async fn insert_execution(&self, _execution: &Execution) -> Result<(), BackhaulError> {
            Ok(())
        }
        async fn update_execution(&self, _execution: &Execution) -> Result<(), BackhaulError> {
            Ok(())
        }
        async fn get_execution(&self, _id: backhaul_protocol::ExecutionId) -> Result<Execution, BackhaulError> {
            Err(BackhaulError::not_found("unused in these tests"))
        }
        async fn list_executions_for_job(&self, _job_id: backhaul_protocol::JobId) -> Result<Vec<Execution>, BackhaulError> {
            Ok(Vec::new())
        }
        async fn has_running_execution(&self, _job_id: backhaul_protocol::JobId) -> Result<bool, BackhaulError> {
            Ok(false)
        }
    }

    fn test_scheduler(concurrency: usize) -> Arc<Scheduler> {
        let job_repo: Arc<dyn JobRepository> = Arc::new(NoopRepo);
        let secret_store = secret_store();
        Scheduler::new(
            job_repo.clone(),
            Arc::new(NoopRepo),
            secret_store.clone(),
            dispatcher(job_repo, secret_store),
            Arc::new(NoopSnapshots),
            SchedulerConfig {
                concurrency,
                tick_interval: Duration::minutes(1),
            },
        )
    }

    #[tokio::test]
    async fn reload_populates_the_cron_table_and_job_locks() {
        // Exercised indirectly: an empty repo yields an empty table and
        // run_now on an unknown job is rejected.
        let scheduler = test_scheduler(4);
        scheduler.reload().await.unwrap();
        let job_id = JobId::new();
        let err = scheduler.run_now(job_id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn second_concurrent_dispatch_for_the_same_job_is_busy() {
        let scheduler = test_scheduler(4);
        let job_id = JobId::new();
        // Seed the cron table directly to avoid depending on a real job.
        scheduler
            .cron_table
            .write()
            .await
            .insert(job_id, CronSpec::parse("0 * * * * *").unwrap());
        scheduler
            .job_locks
            .write()
            .await
            .insert(job_id, Arc::new(Mutex::new(())));

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));

        let first = scheduler
            .try_dispatch(job_id, false, move || async move {
                let rx = release_rx.lock().await.take().unwrap();
                let _ = rx.await;
            })
            .await;
        assert!(first.is_ok());

        // Give the spawned task a chance to acquire the job mutex.
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        let second = scheduler.try_dispatch(job_id, false, || async {}).await;
        assert!(matches!(second, Err(SchedulerError::Busy(_))));

        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn global_semaphore_caps_concurrent_runs() {
        let scheduler = test_scheduler(1);
        let job_a = JobId::new();
        let job_b = JobId::new();
        for job_id in [job_a, job_b] {
            scheduler
                .job_locks
                .write()
                .await
                .insert(job_id, Arc::new(Mutex::new(())));
        }

        let in_flight = Arc::new(AtomicU32::new(0));
        let max_observed = Arc::new(AtomicU32::new(0));
        let (release_tx, release_rx) = tokio::sync::broadcast::channel::<()>(1);
        let release_rx = Arc::new(release_rx);

        for job_id in [job_a, job_b] {
            let in_flight = Arc::clone(&in_flight);
            let max_observed = Arc::clone(&max_observed);
            let mut rx = release_rx.resubscribe();
            scheduler
                .try_dispatch(job_id, false, move || async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    let _ = rx.recv().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
        }

        tokio::time::sleep(StdDuration::from_millis(30)).await;
        assert_eq!(max_observed.load(Ordering::SeqCst), 1);

        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn manual_trigger_queue_stats_reflect_running_count() {
        let scheduler = test_scheduler(4);
        let job_id = JobId::new();
        scheduler
            .cron_table
            .write()
            .await
            .insert(job_id, CronSpec::parse("0 * * * * *").unwrap());
        scheduler
            .job_locks
            .write()
            .await
            .insert(job_id, Arc::new(Mutex::new(())));

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));

        let this = Arc::clone(&scheduler);
        this.try_dispatch(job_id, true, move || async move {
            scheduler_manual_marker(&release_rx).await;
        })
        .await
        .unwrap();

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        let stats = this.queue_stats();
        assert_eq!(stats.running, 1);
        assert_eq!(stats.pending, 0);

        let _ = release_tx.send(());
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(this.queue_stats().running, 0);
    }

    async fn scheduler_manual_marker(rx: &Arc<tokio::sync::Mutex<Option<tokio::sync::oneshot::Receiver<()>>>>) {
        let rx = rx.lock().await.take().unwrap();
        let _ = rx.await;
    }
}
