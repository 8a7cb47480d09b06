//! The backup/restore pipeline (C5, spec §4.5): a linear state machine
//! over a [`RunnerContext`], consuming the shared `JobRepository`/
//! `ExecutionRepository` contracts rather than a concrete store, and the
//! adapter registries from `backhaul_db`/`backhaul_storage` to do the
//! actual work.

pub mod backup;
pub mod context;
pub mod pipeline;
pub mod restore;

pub use backup::run_backup;
pub use context::RunnerContext;
pub use restore::{run_restore, RestoreRequest};
