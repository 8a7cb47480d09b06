//! Notification log (spec §4.8: "record a notification log row with
//! status Success|Failed and the rendered payload"). The distilled spec
//! names no persistence schema for this, so the default implementation
//! is an in-memory ring buffer; a durable `NotificationLog` can be
//! swapped in without touching the dispatcher (see DESIGN.md).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use backhaul_protocol::events::{NotificationEvent, NotificationPayload};
use backhaul_protocol::ids::ChannelId;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone)]
pub struct NotificationLogEntry {
    pub channel_id: ChannelId,
    pub event: NotificationEvent,
    pub payload: NotificationPayload,
    pub status: NotifyStatus,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationLog: Send + Sync {
    async fn record(&self, entry: NotificationLogEntry);
}

/// Bounded in-memory log. Oldest entries are dropped once `capacity` is
/// exceeded so a noisy destination can't grow this without bound.
pub struct BufferingNotificationLog {
    capacity: usize,
    entries: Mutex<VecDeque<NotificationLogEntry>>,
}

impl BufferingNotificationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn snapshot(&self) -> Vec<NotificationLogEntry> {
        self.entries.lock().expect("notification log mutex poisoned").iter().cloned().collect()
    }
}

impl Default for BufferingNotificationLog {
    fn default() -> Self {
        Self::new(500)
    }
}

#[async_trait]
impl NotificationLog for BufferingNotificationLog {
    async fn record(&self, entry: NotificationLogEntry) {
        let mut entries = self.entries.lock().expect("notification log mutex poisoned");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render;
    use backhaul_protocol::events::EventContext;

    fn entry(status: NotifyStatus) -> NotificationLogEntry {
        NotificationLogEntry {
            channel_id: ChannelId::new(),
            event: NotificationEvent::BackupSuccess,
            payload: render(NotificationEvent::BackupSuccess, &EventContext::default()),
            status,
            error: None,
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_are_retained_in_order() {
        let log = BufferingNotificationLog::new(10);
        log.record(entry(NotifyStatus::Success)).await;
        log.record(entry(NotifyStatus::Failed)).await;
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].status, NotifyStatus::Success);
        assert_eq!(snapshot[1].status, NotifyStatus::Failed);
    }

    #[tokio::test]
    async fn oldest_entries_drop_once_capacity_is_exceeded() {
        let log = BufferingNotificationLog::new(2);
        for _ in 0..3 {
            log.record(entry(NotifyStatus::Success)).await;
        }
        assert_eq!(log.snapshot().len(), 2);
    }
}
