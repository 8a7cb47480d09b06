//! Errors raised by the scheduler's own bookkeeping (cron parsing, job
//! lookup, manual-trigger contention). Runner failures are not surfaced
//! here: they're recorded on the execution row by the runner itself.

use thiserror::Error;

use backhaul_protocol::{BackhaulError, ErrorKind, JobId};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("job {0} already has a run in progress")]
    Busy(JobId),

    #[error("job {0} not found or not enabled")]
    JobNotFound(JobId),

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error(transparent)]
    Backhaul(#[from] BackhaulError),
}

impl SchedulerError {
    pub fn invalid_cron(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCron {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

impl From<SchedulerError> for BackhaulError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Busy(job_id) => {
                BackhaulError::new(ErrorKind::Cancelled, format!("job {job_id} is busy"))
            }
            SchedulerError::JobNotFound(job_id) => {
                BackhaulError::not_found(format!("job {job_id} not found or not enabled"))
            }
            SchedulerError::InvalidCron { expression, reason } => {
                BackhaulError::config_invalid(format!("invalid cron expression '{expression}': {reason}"))
            }
            SchedulerError::Backhaul(err) => err,
        }
    }
}
