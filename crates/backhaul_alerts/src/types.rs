//! Types shared between condition evaluation and state-machine
//! de-duplication (spec §4.9).

use chrono::{DateTime, Utc};

use backhaul_protocol::DestinationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    UsageSpike,
    StorageLimit,
    MissingBackup,
}

/// Operator-tuned thresholds for one destination. A `None` field disables
/// that rule outright (spec §4.9: "disabling a rule while active resets
/// it" — handled uniformly by treating a disabled rule as a condition
/// that is never active, which the state machine already resets on).
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    /// Fraction, e.g. `0.5` for "alert at a 50% jump between snapshots".
    pub spike_percent: Option<f64>,
    pub storage_limit_bytes: Option<u64>,
    pub missing_backup_hours: Option<i64>,
}

impl AlertThresholds {
    pub fn disabled() -> Self {
        Self { spike_percent: None, storage_limit_bytes: None, missing_backup_hours: None }
    }
}

/// The persisted `{active, lastNotifiedAt}` pair per destination and
/// alert kind (spec §4.9 "State-machine de-duplication").
#[derive(Debug, Clone)]
pub struct AlertState {
    pub destination_id: DestinationId,
    pub kind: AlertKind,
    pub active: bool,
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl AlertState {
    pub fn inactive(destination_id: DestinationId, kind: AlertKind) -> Self {
        Self { destination_id, kind, active: false, last_notified_at: None }
    }
}

/// One alert that should be notified right now: either a fresh
/// inactive→active transition or a re-fire after the cooldown elapsed.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub destination_id: DestinationId,
    pub kind: AlertKind,
    pub detail: String,
}
