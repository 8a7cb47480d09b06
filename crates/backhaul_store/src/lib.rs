//! The configuration/execution store (C7, spec §5 + §4.7): a single SQLite
//! database implementing the `JobRepository`/`ExecutionRepository`
//! contracts from `backhaul_protocol` so the Runner and Scheduler never
//! need to know the concrete storage engine.

pub mod error;
pub mod pool;
pub mod schema;
pub mod store;

pub use error::StoreError;
pub use pool::{connect, StoreConfig};
pub use store::Store;
