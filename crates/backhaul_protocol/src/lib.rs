//! Shared domain model for Backhaul: IDs, entities, error kinds, and the
//! small wire contracts (events, log entries, sidecar JSON) that every other
//! crate in the workspace builds on.

pub mod artifact;
pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod ids;
pub mod model;
pub mod naming;
pub mod reporter;
pub mod repository;

pub use artifact::{Artifact, DatabasesLabel, Sidecar, SidecarEncryption, StorageSnapshot};
pub use cancel::CancellationToken;
pub use error::{BackhaulError, ErrorKind};
pub use events::{EventContext, NotificationEvent, NotificationPayload, NotifyCondition, PayloadField};
pub use execution::{Execution, ExecutionKind, ExecutionStatus, LogEntry, LogLevel, LogType};
pub use ids::{ChannelId, DestinationId, ExecutionId, JobId, ProfileId, SourceId};
pub use model::{
    Channel, ChannelKind, CompressionKind, DatabaseKind, Destination, EncryptionProfile, Job,
    NotificationCondition, RetentionPolicy, Source, StorageKind,
};
pub use reporter::{BufferingReporter, CompositeReporter, Reporter, TracingReporter};
pub use repository::{ExecutionRepository, JobRepository};
