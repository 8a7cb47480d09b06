//! Notification rendering and dispatch (C8, spec §4.8): a pure template
//! layer (`render`), an adapter-native body mapper (`channel_body`), a
//! generic HTTP transport (`sink`), an in-memory delivery log (`log`),
//! and the fan-out coordinator (`dispatcher`) tying them together.
//! Depends on `JobRepository` rather than a concrete store, the same way
//! `backhaul_scheduler` does.

pub mod channel_body;
pub mod dispatcher;
pub mod error;
pub mod log;
pub mod render;
pub mod sink;

pub use channel_body::{map_channel_body, ChannelBody};
pub use dispatcher::Dispatcher;
pub use error::NotifyError;
pub use log::{BufferingNotificationLog, NotificationLog, NotificationLogEntry, NotifyStatus};
pub use render::render;
pub use sink::{ChannelEndpoint, HttpNotifySink, NotifySink};
