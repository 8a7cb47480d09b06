//! Event → payload template rendering (spec §4.8). Pure functions of
//! `(event, context)`; nothing here touches a channel or the network.

use backhaul_protocol::events::{EventContext, NotificationEvent, NotificationPayload, PayloadField};

const COLOR_SUCCESS: &str = "#2ecc71";
const COLOR_FAILURE: &str = "#e74c3c";
const COLOR_WARNING: &str = "#f39c12";
const COLOR_INFO: &str = "#3498db";

fn job_name(ctx: &EventContext) -> &str {
    ctx.job_name.as_deref().unwrap_or("unknown job")
}

fn detail_field(ctx: &EventContext) -> Vec<PayloadField> {
    ctx.detail
        .as_ref()
        .map(|detail| {
            vec![PayloadField {
                name: "Detail".to_string(),
                value: detail.clone(),
                inline: Some(false),
            }]
        })
        .unwrap_or_default()
}

/// Renders `event` against `context` into an adapter-agnostic payload.
/// Every variant of the closed `NotificationEvent` enum is handled here;
/// adding a new event means adding an arm, not a new dispatcher code path.
pub fn render(event: NotificationEvent, ctx: &EventContext) -> NotificationPayload {
    match event {
        NotificationEvent::BackupSuccess => NotificationPayload {
            title: "Backup succeeded".to_string(),
            message: format!("Backup of '{}' completed successfully.", job_name(ctx)),
            success: true,
            color: COLOR_SUCCESS.to_string(),
            badge: Some("backup".to_string()),
            fields: detail_field(ctx),
        },
        NotificationEvent::BackupFailure => NotificationPayload {
            title: "Backup failed".to_string(),
            message: format!("Backup of '{}' failed.", job_name(ctx)),
            success: false,
            color: COLOR_FAILURE.to_string(),
            badge: Some("backup".to_string()),
            fields: detail_field(ctx),
        },
        NotificationEvent::RestoreComplete => NotificationPayload {
            title: "Restore completed".to_string(),
            message: format!("Restore for '{}' completed successfully.", job_name(ctx)),
            success: true,
            color: COLOR_SUCCESS.to_string(),
            badge: Some("restore".to_string()),
            fields: detail_field(ctx),
        },
        NotificationEvent::RestoreFailure => NotificationPayload {
            title: "Restore failed".to_string(),
            message: format!("Restore for '{}' failed.", job_name(ctx)),
            success: false,
            color: COLOR_FAILURE.to_string(),
            badge: Some("restore".to_string()),
            fields: detail_field(ctx),
        },
        NotificationEvent::ConfigBackup => NotificationPayload {
            title: "Configuration backup".to_string(),
            message: "The system configuration was backed up.".to_string(),
            success: true,
            color: COLOR_INFO.to_string(),
            badge: Some("config".to_string()),
            fields: detail_field(ctx),
        },
        NotificationEvent::SystemError => NotificationPayload {
            title: "System error".to_string(),
            message: ctx
                .detail
                .clone()
                .unwrap_or_else(|| "An internal error occurred.".to_string()),
            success: false,
            color: COLOR_FAILURE.to_string(),
            badge: Some("system".to_string()),
            fields: Vec::new(),
        },
        NotificationEvent::UserLogin => NotificationPayload {
            title: "User login".to_string(),
            message: match &ctx.user_email {
                Some(email) => format!("{email} signed in."),
                None => "A user signed in.".to_string(),
            },
            success: true,
            color: COLOR_INFO.to_string(),
            badge: Some("auth".to_string()),
            fields: Vec::new(),
        },
        NotificationEvent::UserCreated => NotificationPayload {
            title: "User created".to_string(),
            message: match &ctx.user_email {
                Some(email) => format!("Account {email} was created."),
                None => "A new account was created.".to_string(),
            },
            success: true,
            color: COLOR_INFO.to_string(),
            badge: Some("auth".to_string()),
            fields: Vec::new(),
        },
        NotificationEvent::StorageUsageSpike => NotificationPayload {
            title: "Storage usage spike".to_string(),
            message: "A destination's storage usage jumped sharply between snapshots.".to_string(),
            success: false,
            color: COLOR_WARNING.to_string(),
            badge: Some("storage".to_string()),
            fields: detail_field(ctx),
        },
        NotificationEvent::StorageLimitWarning => NotificationPayload {
            title: "Storage limit warning".to_string(),
            message: "A destination is approaching its configured storage limit.".to_string(),
            success: false,
            color: COLOR_WARNING.to_string(),
            badge: Some("storage".to_string()),
            fields: detail_field(ctx),
        },
        NotificationEvent::StorageMissingBackup => NotificationPayload {
            title: "Missing backup".to_string(),
            message: "A destination has not received a new backup within the configured window.".to_string(),
            success: false,
            color: COLOR_WARNING.to_string(),
            badge: Some("storage".to_string()),
            fields: detail_field(ctx),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_success_renders_as_success_with_job_name() {
        let ctx = EventContext {
            job_name: Some("nightly-pg".to_string()),
            ..Default::default()
        };
        let payload = render(NotificationEvent::BackupSuccess, &ctx);
        assert!(payload.success);
        assert!(payload.message.contains("nightly-pg"));
        assert_eq!(payload.color, COLOR_SUCCESS);
    }

    #[test]
    fn backup_failure_carries_the_detail_field() {
        let ctx = EventContext {
            job_name: Some("nightly-pg".to_string()),
            detail: Some("connection refused".to_string()),
            ..Default::default()
        };
        let payload = render(NotificationEvent::BackupFailure, &ctx);
        assert!(!payload.success);
        assert_eq!(payload.fields.len(), 1);
        assert_eq!(payload.fields[0].value, "connection refused");
    }

    #[test]
    fn system_error_uses_detail_as_the_message_when_present() {
        let ctx = EventContext {
            detail: Some("disk full".to_string()),
            ..Default::default()
        };
        let payload = render(NotificationEvent::SystemError, &ctx);
        assert_eq!(payload.message, "disk full");
    }

    #[test]
    fn user_login_falls_back_when_no_email_is_known() {
        let payload = render(NotificationEvent::UserLogin, &EventContext::default());
        assert_eq!(payload.message, "A user signed in.");
    }

    #[test]
    fn every_event_renders_without_panicking() {
        let ctx = EventContext::default();
        for event in [
            NotificationEvent::BackupSuccess,
            NotificationEvent::BackupFailure,
            NotificationEvent::RestoreComplete,
            NotificationEvent::RestoreFailure,
            NotificationEvent::ConfigBackup,
            NotificationEvent::SystemError,
            NotificationEvent::UserLogin,
            NotificationEvent::UserCreated,
            NotificationEvent::StorageUsageSpike,
            NotificationEvent::StorageLimitWarning,
            NotificationEvent::StorageMissingBackup,
        ] {
            let _ = render(event, &ctx);
        }
    }
}
