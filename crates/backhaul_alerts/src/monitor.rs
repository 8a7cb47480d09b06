//! The alert monitor (C9, spec §4.9): evaluates the three conditions
//! against a destination's snapshot history and runs each through the
//! `{active, lastNotifiedAt}` state machine, returning only the alerts
//! that should be notified right now.

use chrono::{DateTime, Duration, Utc};

use backhaul_protocol::DestinationId;

use crate::conditions;
use crate::error::AlertError;
use crate::repository::AlertStateRepository;
use crate::types::{AlertEvent, AlertKind, AlertState, AlertThresholds};

const RENOTIFY_COOLDOWN_HOURS: i64 = 24;

pub struct AlertMonitor<'a> {
    states: &'a dyn AlertStateRepository,
}

impl<'a> AlertMonitor<'a> {
    pub fn new(states: &'a dyn AlertStateRepository) -> Self {
        Self { states }
    }

    /// Evaluates all three conditions for one destination against
    /// `history` (newest snapshot first) and returns the alerts that
    /// should be notified: either a fresh inactive→active transition or
    /// a re-fire past the 24-hour cooldown.
    pub async fn evaluate(
        &self,
        destination_id: DestinationId,
        thresholds: &AlertThresholds,
        history: &[backhaul_protocol::StorageSnapshot],
        now: DateTime<Utc>,
    ) -> Result<Vec<AlertEvent>, AlertError> {
        let mut fired = Vec::new();

        if let Some(event) = self
            .transition(
                destination_id,
                AlertKind::UsageSpike,
                thresholds
                    .spike_percent
                    .is_some_and(|pct| conditions::usage_spike(history, pct)),
                || "storage usage changed sharply since the previous snapshot".to_string(),
                now,
            )
            .await?
        {
            fired.push(event);
        }

        if let Some(event) = self
            .transition(
                destination_id,
                AlertKind::StorageLimit,
                thresholds
                    .storage_limit_bytes
                    .is_some_and(|limit| conditions::storage_limit_exceeded(history, limit)),
                || "destination is at or above 90% of its configured storage limit".to_string(),
                now,
            )
            .await?
        {
            fired.push(event);
        }

        if let Some(event) = self
            .transition(
                destination_id,
                AlertKind::MissingBackup,
                thresholds
                    .missing_backup_hours
                    .is_some_and(|hours| conditions::missing_backup(history, now, hours)),
                || "no new backup has landed within the configured window".to_string(),
                now,
            )
            .await?
        {
            fired.push(event);
        }

        Ok(fired)
    }

    async fn transition(
        &self,
        destination_id: DestinationId,
        kind: AlertKind,
        condition_active: bool,
        detail: impl FnOnce() -> String,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertEvent>, AlertError> {
        let mut state = self
            .states
            .get_state(destination_id, kind)
            .await?
            .unwrap_or_else(|| AlertState::inactive(destination_id, kind));

        let just_activated = condition_active && !state.active;
        let cooldown_elapsed = condition_active
            && state.active
            && match state.last_notified_at {
                Some(last) => now.signed_duration_since(last) >= Duration::hours(RENOTIFY_COOLDOWN_HOURS),
                None => true,
            };
        let should_fire = just_activated || cooldown_elapsed;

        let changed = state.active != condition_active || should_fire;
        if !changed {
            return Ok(None);
        }

        state.active = condition_active;
        if should_fire {
            state.last_notified_at = Some(now);
        } else if !condition_active {
            state.last_notified_at = None;
        }

        self.states.put_state(&state).await?;

        Ok(should_fire.then(|| AlertEvent { destination_id, kind, detail: detail() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backhaul_protocol::BackhaulError;
    use std::sync::Mutex;

    struct FakeStateRepo {
        states: Mutex<Vec<AlertState>>,
    }

    impl FakeStateRepo {
        fn new() -> Self {
            Self { states: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl AlertStateRepository for FakeStateRepo {
        async fn get_state(&self, destination_id: DestinationId, kind: AlertKind) -> Result<Option<AlertState>, BackhaulError> {
            Ok(self
                .states
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.destination_id == destination_id && s.kind == kind)
                .cloned())
        }

        async fn put_state(&self, state: &AlertState) -> Result<(), BackhaulError> {
            let mut states = self.states.lock().unwrap();
            states.retain(|s| !(s.destination_id == state.destination_id && s.kind == state.kind));
            states.push(state.clone());
            Ok(())
        }
    }

    fn snapshot(bytes: u64, files: u64, captured_at: &str, destination_id: DestinationId) -> backhaul_protocol::StorageSnapshot {
        backhaul_protocol::StorageSnapshot {
            destination_id,
            total_size_bytes: bytes,
            file_count: files,
            captured_at: captured_at.parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn inactive_to_active_transition_fires_once() {
        let repo = FakeStateRepo::new();
        let monitor = AlertMonitor::new(&repo);
        let destination_id = DestinationId::new();
        let thresholds = AlertThresholds {
            spike_percent: Some(0.5),
            storage_limit_bytes: None,
            missing_backup_hours: None,
        };
        let history = vec![
            snapshot(1_600, 10, "2026-01-02T00:00:00Z", destination_id),
            snapshot(1_000, 10, "2026-01-01T00:00:00Z", destination_id),
        ];
        let now: DateTime<Utc> = "2026-01-02T00:00:00Z".parse().unwrap();

        let fired = monitor.evaluate(destination_id, &thresholds, &history, now).await.unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, AlertKind::UsageSpike);

        let fired_again = monitor.evaluate(destination_id, &thresholds, &history, now).await.unwrap();
        assert!(fired_again.is_empty(), "still active, within cooldown: must not re-fire");
    }

    #[tokio::test]
    async fn refires_after_the_cooldown_elapses() {
        let repo = FakeStateRepo::new();
        let monitor = AlertMonitor::new(&repo);
        let destination_id = DestinationId::new();
        let thresholds = AlertThresholds {
            spike_percent: None,
            storage_limit_bytes: Some(1_000),
            missing_backup_hours: None,
        };
        let history = vec![snapshot(950, 10, "2026-01-01T00:00:00Z", destination_id)];
        let first_fire: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let fired = monitor.evaluate(destination_id, &thresholds, &history, first_fire).await.unwrap();
        assert_eq!(fired.len(), 1);

        let still_cooling: DateTime<Utc> = "2026-01-01T12:00:00Z".parse().unwrap();
        let fired = monitor.evaluate(destination_id, &thresholds, &history, still_cooling).await.unwrap();
        assert!(fired.is_empty());

        let past_cooldown: DateTime<Utc> = "2026-01-02T01:00:00Z".parse().unwrap();
        let fired = monitor.evaluate(destination_id, &thresholds, &history, past_cooldown).await.unwrap();
        assert_eq!(fired.len(), 1);
    }

    #[tokio::test]
    async fn resolving_the_condition_resets_to_inactive_without_firing() {
        let repo = FakeStateRepo::new();
        let monitor = AlertMonitor::new(&repo);
        let destination_id = DestinationId::new();
        let thresholds = AlertThresholds {
            spike_percent: None,
            storage_limit_bytes: Some(1_000),
            missing_backup_hours: None,
        };
        let now: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let over_limit = vec![snapshot(950, 10, "2026-01-01T00:00:00Z", destination_id)];
        monitor.evaluate(destination_id, &thresholds, &over_limit, now).await.unwrap();

        let under_limit = vec![snapshot(10, 10, "2026-01-01T01:00:00Z", destination_id)];
        let fired = monitor
            .evaluate(destination_id, &thresholds, &under_limit, now + Duration::hours(1))
            .await
            .unwrap();
        assert!(fired.is_empty());

        let state = repo.get_state(destination_id, AlertKind::StorageLimit).await.unwrap().unwrap();
        assert!(!state.active);
        assert!(state.last_notified_at.is_none());
    }

    #[tokio::test]
    async fn disabling_a_rule_while_active_resets_it() {
        let repo = FakeStateRepo::new();
        let monitor = AlertMonitor::new(&repo);
        let destination_id = DestinationId::new();
        let armed = AlertThresholds { spike_percent: None, storage_limit_bytes: Some(1_000), missing_backup_hours: None };
        let now: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let history = vec![snapshot(950, 10, "2026-01-01T00:00:00Z", destination_id)];
        monitor.evaluate(destination_id, &armed, &history, now).await.unwrap();

        let disabled = AlertThresholds::disabled();
        let fired = monitor.evaluate(destination_id, &disabled, &history, now).await.unwrap();
        assert!(fired.is_empty());
        let state = repo.get_state(destination_id, AlertKind::StorageLimit).await.unwrap().unwrap();
        assert!(!state.active);
    }
}
