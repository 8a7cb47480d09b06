//! Background storage monitoring (spec §4.9): periodically snapshots every
//! destination in use, feeds the history to [`AlertMonitor`], and routes
//! any fired [`AlertEvent`] through the notification dispatcher.
//!
//! Snapshot history and alert state are kept in process memory, the same
//! restart-loses-state tradeoff the scheduler's own cron table makes
//! (spec §4.6 "the scheduler itself is stateless across restarts"): a
//! restart simply starts the spike/cooldown detectors cold, which is no
//! worse than a fresh deployment's first tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use backhaul_alerts::{AlertEvent, AlertMonitor, AlertStateRepository, AlertState, AlertThresholds, SnapshotRepository};
use backhaul_notify::Dispatcher;
use backhaul_protocol::{
    BackhaulError, Channel, DestinationId, EventContext, JobRepository, NotificationEvent,
    NotifyCondition, StorageKind, StorageSnapshot,
};
use backhaul_security::SecretStore;
use backhaul_storage::{build_adapter, capture_snapshot};

const HISTORY_PER_DESTINATION: usize = 64;

/// Bounded, newest-first ring of snapshots per destination.
#[derive(Default)]
pub struct InMemorySnapshotRepository {
    history: DashMap<DestinationId, Vec<StorageSnapshot>>,
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn record_snapshot(&self, snapshot: &StorageSnapshot) -> Result<(), BackhaulError> {
        let mut entry = self.history.entry(snapshot.destination_id).or_default();
        entry.insert(0, snapshot.clone());
        entry.truncate(HISTORY_PER_DESTINATION);
        Ok(())
    }

    async fn recent_snapshots(
        &self,
        destination_id: DestinationId,
        limit: usize,
    ) -> Result<Vec<StorageSnapshot>, BackhaulError> {
        Ok(self
            .history
            .get(&destination_id)
            .map(|entry| entry.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryAlertStateRepository {
    states: Mutex<HashMap<(DestinationId, backhaul_alerts::AlertKind), AlertState>>,
}

#[async_trait]
impl AlertStateRepository for InMemoryAlertStateRepository {
    async fn get_state(
        &self,
        destination_id: DestinationId,
        kind: backhaul_alerts::AlertKind,
    ) -> Result<Option<AlertState>, BackhaulError> {
        Ok(self.states.lock().await.get(&(destination_id, kind)).cloned())
    }

    async fn put_state(&self, state: &AlertState) -> Result<(), BackhaulError> {
        self.states
            .lock()
            .await
            .insert((state.destination_id, state.kind), state.clone());
        Ok(())
    }
}

/// Converts a fired alert into a notification event and dispatches it to
/// the global channel list. Channel ids come from `BACKHAUL_ALERT_CHANNELS`
/// (comma-separated) since alerts are destination-scoped, not job-scoped,
/// and so have no per-job channel list to fall back on.
async fn notify_alert(dispatcher: &Dispatcher, channels: &[Channel], event: AlertEvent) {
    let notification_event = match event.kind {
        backhaul_alerts::AlertKind::UsageSpike => NotificationEvent::StorageUsageSpike,
        backhaul_alerts::AlertKind::StorageLimit => NotificationEvent::StorageLimitWarning,
        backhaul_alerts::AlertKind::MissingBackup => NotificationEvent::StorageMissingBackup,
    };

    let ctx = EventContext {
        detail: Some(event.detail),
        ..Default::default()
    };

    dispatcher
        .dispatch_system_event(channels, notification_event, &ctx, NotifyCondition::None)
        .await;
}

/// Runs one evaluation pass over every destination referenced by an
/// enabled job: capture a snapshot, record it, evaluate thresholds,
/// dispatch any fired alert.
pub async fn run_once(
    job_repo: &dyn JobRepository,
    secret_store: &SecretStore,
    snapshots: &dyn SnapshotRepository,
    states: &dyn AlertStateRepository,
    dispatcher: &Dispatcher,
    alert_channels: &[Channel],
    thresholds: &AlertThresholds,
) {
    let jobs = match job_repo.list_enabled_jobs().await {
        Ok(jobs) => jobs,
        Err(err) => {
            warn!(%err, "alert loop could not list enabled jobs");
            return;
        }
    };

    let mut seen = std::collections::HashSet::new();
    for job in jobs {
        if !seen.insert(job.destination_id) {
            continue;
        }

        let destination = match job_repo.get_destination(job.destination_id).await {
            Ok(destination) => destination,
            Err(err) => {
                warn!(destination_id = %job.destination_id, %err, "alert loop could not load destination");
                continue;
            }
        };

        if let Err(err) = evaluate_destination(
            destination.id,
            destination.kind,
            &destination.encrypted_config,
            secret_store,
            snapshots,
            states,
            dispatcher,
            alert_channels,
            thresholds,
        )
        .await
        {
            warn!(destination_id = %destination.id, %err, "alert loop evaluation failed");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn evaluate_destination(
    destination_id: DestinationId,
    kind: StorageKind,
    encrypted_config: &[u8],
    secret_store: &SecretStore,
    snapshots: &dyn SnapshotRepository,
    states: &dyn AlertStateRepository,
    dispatcher: &Dispatcher,
    alert_channels: &[Channel],
    thresholds: &AlertThresholds,
) -> Result<(), BackhaulError> {
    let config_bytes = secret_store.decrypt(encrypted_config).map_err(BackhaulError::from)?;
    let config_json = std::str::from_utf8(&config_bytes)
        .map_err(|_| BackhaulError::config_invalid("destination config is not valid utf-8"))?;
    let adapter = build_adapter(kind, config_json).await.map_err(BackhaulError::from)?;

    let snapshot = capture_snapshot(adapter.as_ref(), destination_id)
        .await
        .map_err(BackhaulError::from)?;
    snapshots.record_snapshot(&snapshot).await?;

    let history = snapshots.recent_snapshots(destination_id, HISTORY_PER_DESTINATION).await?;
    let monitor = AlertMonitor::new(states);
    let events = monitor
        .evaluate(destination_id, thresholds, &history, Utc::now())
        .await
        .map_err(BackhaulError::from)?;

    for event in events {
        info!(destination_id = %destination_id, kind = ?event.kind, "storage alert fired");
        notify_alert(dispatcher, alert_channels, event).await;
    }

    Ok(())
}

/// Spawns the periodic alert-evaluation loop. Returns the task handle so
/// the caller can abort it on shutdown.
pub fn spawn(
    job_repo: Arc<dyn JobRepository>,
    secret_store: Arc<SecretStore>,
    snapshots: Arc<InMemorySnapshotRepository>,
    states: Arc<InMemoryAlertStateRepository>,
    dispatcher: Arc<Dispatcher>,
    alert_channels: Vec<Channel>,
    thresholds: AlertThresholds,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            run_once(
                job_repo.as_ref(),
                secret_store.as_ref(),
                snapshots.as_ref(),
                states.as_ref(),
                dispatcher.as_ref(),
                &alert_channels,
                &thresholds,
            )
            .await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_repository_keeps_newest_first_and_bounded_history() {
        let repo = InMemorySnapshotRepository::default();
        let destination_id = DestinationId::new();
        for file_count in 0..3u64 {
            repo.record_snapshot(&StorageSnapshot {
                destination_id,
                total_size_bytes: 0,
                file_count,
                captured_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        let recent = repo.recent_snapshots(destination_id, 10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].file_count, 2);
    }

    #[tokio::test]
    async fn alert_state_repository_round_trips() {
        let repo = InMemoryAlertStateRepository::default();
        let destination_id = DestinationId::new();
        let state = AlertState {
            destination_id,
            kind: backhaul_alerts::AlertKind::UsageSpike,
            active: true,
            last_notified_at: Some(Utc::now()),
        };
        repo.put_state(&state).await.unwrap();
        let loaded = repo
            .get_state(destination_id, backhaul_alerts::AlertKind::UsageSpike)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.active, state.active);
    }
}
