//! Persistence contracts this crate needs but `backhaul_protocol` does
//! not yet define (see DESIGN.md's Open Question decision for why these
//! live here rather than alongside `JobRepository`/`ExecutionRepository`).
//! `backhaul_store` or any other store can implement them.

use async_trait::async_trait;

use backhaul_protocol::{BackhaulError, DestinationId, StorageSnapshot};

use crate::types::{AlertKind, AlertState};

/// Append-and-read access to a destination's captured snapshot history.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn record_snapshot(&self, snapshot: &StorageSnapshot) -> Result<(), BackhaulError>;

    /// Most recent `limit` snapshots for `destination_id`, newest first.
    async fn recent_snapshots(
        &self,
        destination_id: DestinationId,
        limit: usize,
    ) -> Result<Vec<StorageSnapshot>, BackhaulError>;
}

/// The `{active, lastNotifiedAt}` pair per destination and alert kind.
#[async_trait]
pub trait AlertStateRepository: Send + Sync {
    async fn get_state(
        &self,
        destination_id: DestinationId,
        kind: AlertKind,
    ) -> Result<Option<AlertState>, BackhaulError>;

    /// Persists `state`. Callers only invoke this when the state actually
    /// changed (spec §4.9: "persists... atomically only when changed").
    async fn put_state(&self, state: &AlertState) -> Result<(), BackhaulError>;
}
