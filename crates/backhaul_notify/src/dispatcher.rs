//! Fan-out (spec §4.8 "Dispatch"): resolve a channel list, render a
//! payload once, map it per channel, send, and log — job-scoped events
//! use the job's own channels gated by its `notification_condition`;
//! system events take an explicit channel list since there is no
//! system-settings model in scope here (see DESIGN.md).

use std::sync::Arc;

use backhaul_protocol::events::{EventContext, NotificationEvent, NotifyCondition};
use backhaul_protocol::model::{Channel, ChannelKind, Job, NotificationCondition};
use backhaul_protocol::repository::JobRepository;
use backhaul_security::SecretStore;
use serde::Deserialize;
use tracing::{error, warn};

use crate::channel_body::map_channel_body;
use crate::error::NotifyError;
use crate::log::{NotificationLog, NotificationLogEntry, NotifyStatus};
use crate::render::render;
use crate::sink::{ChannelEndpoint, NotifySink};

/// The minimal shape every channel's decrypted config carries. Full
/// per-vendor adapter configuration is out of scope (only the payload
/// contract is); `url` is all `HttpNotifySink` needs, and `to` covers
/// the email per-user override.
#[derive(Debug, Clone, Deserialize)]
struct ChannelConfig {
    url: String,
    #[serde(default)]
    to: Option<String>,
}

pub struct Dispatcher {
    job_repo: Arc<dyn JobRepository>,
    secret_store: Arc<SecretStore>,
    sink: Arc<dyn NotifySink>,
    log: Arc<dyn NotificationLog>,
}

impl Dispatcher {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        secret_store: Arc<SecretStore>,
        sink: Arc<dyn NotifySink>,
        log: Arc<dyn NotificationLog>,
    ) -> Self {
        Self { job_repo, secret_store, sink, log }
    }

    /// Dispatches a job-scoped event (backup/restore outcome) to the
    /// job's configured channels, gated by `job.notification_condition`.
    pub async fn dispatch_job_event(&self, job: &Job, event: NotificationEvent, ctx: &EventContext) {
        let payload = render(event, ctx);
        if !job_condition_allows(job.notification_condition, payload.success) {
            return;
        }
        let channels = match self.job_repo.get_channels(&job.notification_channel_ids).await {
            Ok(channels) => channels,
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "failed to resolve notification channels for job");
                return;
            }
        };
        self.fan_out(&channels, event, &payload, NotifyCondition::None, None).await;
    }

    /// Dispatches a system-scoped event to an explicit channel list
    /// (the caller resolves "global channels, with per-event overrides"
    /// from system settings; that resolution lives outside this crate).
    pub async fn dispatch_system_event(
        &self,
        channels: &[Channel],
        event: NotificationEvent,
        ctx: &EventContext,
        notify_user: NotifyCondition,
    ) {
        let payload = render(event, ctx);
        self.fan_out(channels, event, &payload, notify_user, ctx.user_email.as_deref())
            .await;
    }

    async fn fan_out(
        &self,
        channels: &[Channel],
        event: NotificationEvent,
        payload: &backhaul_protocol::events::NotificationPayload,
        notify_user: NotifyCondition,
        user_email: Option<&str>,
    ) {
        for channel in channels {
            let only_user = notify_user == NotifyCondition::Only;
            if only_user && channel.kind != ChannelKind::Email {
                continue;
            }
            let to_override = (channel.kind == ChannelKind::Email
                && matches!(notify_user, NotifyCondition::Also | NotifyCondition::Only))
            .then_some(user_email)
            .flatten();

            let outcome = self.send_to_channel(channel, payload, to_override).await;
            self.log
                .record(NotificationLogEntry {
                    channel_id: channel.id,
                    event,
                    payload: payload.clone(),
                    status: match &outcome {
                        Ok(()) => NotifyStatus::Success,
                        Err(_) => NotifyStatus::Failed,
                    },
                    error: outcome.as_ref().err().map(|err| err.to_string()),
                    sent_at: chrono::Utc::now(),
                })
                .await;
            if let Err(err) = outcome {
                error!(channel = %channel.name, error = %err, "notification delivery failed");
            }
        }
    }

    async fn send_to_channel(
        &self,
        channel: &Channel,
        payload: &backhaul_protocol::events::NotificationPayload,
        to_override: Option<&str>,
    ) -> Result<(), NotifyError> {
        let plaintext = self
            .secret_store
            .decrypt(&channel.encrypted_config)
            .map_err(|_| NotifyError::ConfigUndecryptable(channel.name.clone()))?;
        let config_str = std::str::from_utf8(plaintext.as_slice())
            .map_err(|_| NotifyError::ConfigNotUtf8(channel.name.clone()))?;
        let mut config: ChannelConfig = serde_json::from_str(config_str)
            .map_err(|err| NotifyError::Transport(channel.name.clone(), format!("invalid channel config: {err}")))?;
        if let Some(to) = to_override {
            config.to = Some(to.to_string());
        }

        let body = map_channel_body(payload, channel.kind);
        let endpoint = ChannelEndpoint { channel_name: channel.name.clone(), url: config.url };
        self.sink.send(&endpoint, &body).await
    }
}

fn job_condition_allows(condition: NotificationCondition, success: bool) -> bool {
    match condition {
        NotificationCondition::Always => true,
        NotificationCondition::SuccessOnly => success,
        NotificationCondition::FailureOnly => !success,
    }
}
