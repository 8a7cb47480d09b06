//! Notification event payload contract (spec §4.8). The dispatcher itself
//! lives in `backhaul_notify`; this module defines the closed event enum
//! and the adapter-agnostic payload every template renders to.

use serde::{Deserialize, Serialize};

use crate::ids::JobId;

/// The closed set of events the system can notify about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    BackupSuccess,
    BackupFailure,
    RestoreComplete,
    RestoreFailure,
    ConfigBackup,
    SystemError,
    UserLogin,
    UserCreated,
    StorageUsageSpike,
    StorageLimitWarning,
    StorageMissingBackup,
}

impl NotificationEvent {
    /// Job-scoped events fan out to the job's own channel list; all others
    /// are system-scoped and use the global channel list (spec §4.8).
    pub fn is_job_scoped(&self) -> bool {
        matches!(
            self,
            NotificationEvent::BackupSuccess
                | NotificationEvent::BackupFailure
                | NotificationEvent::RestoreComplete
                | NotificationEvent::RestoreFailure
        )
    }

    /// `config_invalid`/integrity-class errors escalate regardless of a
    /// job's notification condition (spec §7); this event is always sent.
    pub fn always_notifies(&self) -> bool {
        matches!(self, NotificationEvent::SystemError)
    }
}

/// Per-user delivery mode for events that carry a user identity
/// (spec §4.8 "per-user mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifyCondition {
    #[default]
    None,
    Also,
    Only,
}

/// One field in a rendered payload's detail table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadField {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub inline: Option<bool>,
}

/// Adapter-agnostic rendering of an event. Each channel adapter maps this
/// to its native body (embed, HTML, form-encoded SMS, generic JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    pub success: bool,
    /// Hex color, e.g. `#2ecc71` for success, `#e74c3c` for failure.
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub badge: Option<String>,
    pub fields: Vec<PayloadField>,
}

/// Context carried alongside an event when rendering (job name, optional
/// user email for per-user overrides, etc). Kept separate from the
/// rendered payload so templates stay pure functions of `(event, context)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventContext {
    pub job_id: Option<JobId>,
    pub job_name: Option<String>,
    pub user_email: Option<String>,
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_events_are_job_scoped() {
        assert!(NotificationEvent::BackupSuccess.is_job_scoped());
        assert!(NotificationEvent::RestoreFailure.is_job_scoped());
    }

    #[test]
    fn system_events_are_not_job_scoped() {
        assert!(!NotificationEvent::SystemError.is_job_scoped());
        assert!(!NotificationEvent::StorageUsageSpike.is_job_scoped());
    }

    #[test]
    fn system_error_always_notifies() {
        assert!(NotificationEvent::SystemError.always_notifies());
        assert!(!NotificationEvent::BackupFailure.always_notifies());
    }

    #[test]
    fn event_serializes_to_snake_case() {
        let json = serde_json::to_string(&NotificationEvent::StorageMissingBackup).unwrap();
        assert_eq!(json, "\"storage_missing_backup\"");
    }
}
