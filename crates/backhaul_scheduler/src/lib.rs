//! The scheduler (C6, spec §4.6): a single long-lived coordinator owning
//! cron evaluation, per-job mutual exclusion, a global concurrency slot,
//! and manual triggers. Depends on `JobRepository`/`ExecutionRepository`
//! rather than a concrete store, and spawns `backhaul_runner::run_backup`
//! — it never touches adapters directly.

pub mod cron_table;
pub mod error;
pub mod scheduler;

pub use cron_table::CronSpec;
pub use error::SchedulerError;
pub use scheduler::{QueueStats, Scheduler, SchedulerConfig};
