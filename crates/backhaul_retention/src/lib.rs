//! Retention planner (C4): a pure function over artifacts and policy.

pub mod plan;
pub mod report;

pub use plan::{plan, Decision, Plan, RetentionReason, SmartBucket};
pub use report::RetentionReport;
