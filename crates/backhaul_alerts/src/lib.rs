//! Storage alert monitor (C9, spec §4.9): usage-spike, storage-limit, and
//! missing-backup detection over a destination's snapshot history, with
//! state-machine de-duplication so a standing condition notifies once and
//! then only every 24 hours. Depends on `SnapshotRepository`/
//! `AlertStateRepository` (defined here — see DESIGN.md) rather than a
//! concrete store, the same dependency-inversion shape as
//! `backhaul_scheduler` and `backhaul_notify`.

pub mod conditions;
pub mod error;
pub mod monitor;
pub mod repository;
pub mod types;

pub use error::AlertError;
pub use monitor::AlertMonitor;
pub use repository::{AlertStateRepository, SnapshotRepository};
pub use types::{AlertEvent, AlertKind, AlertState, AlertThresholds};
