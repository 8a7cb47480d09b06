//! Execution records: the run-time trace of a single job invocation
//! (spec §3 "Execution", §4.7 log buffering).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackhaulError;
use crate::ids::{ExecutionId, JobId};

/// Whether an execution is a backup or a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionKind {
    Backup,
    Restore,
}

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// True once the execution will never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Severity of a single log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Which stage emitted a log line, matching the runner's pipeline stages
/// (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Resolve,
    Dump,
    Transform,
    Upload,
    Sidecar,
    Retention,
    Finalize,
}

/// A single structured log line attached to an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub log_type: LogType,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, log_type: LogType, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            log_type,
            message: message.into(),
        }
    }
}

/// A single execution of a job: one run of the backup or restore pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub job_id: JobId,
    pub kind: ExecutionKind,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Fraction in `[0.0, 1.0]`, weighted per stage (spec §4.5).
    pub progress: f32,
    pub artifact_size_bytes: Option<u64>,
    pub error: Option<BackhaulError>,
    pub logs: Vec<LogEntry>,
}

impl Execution {
    pub fn new_queued(job_id: JobId, kind: ExecutionKind) -> Self {
        Self {
            id: ExecutionId::new(),
            job_id,
            kind,
            status: ExecutionStatus::Queued,
            started_at: Utc::now(),
            finished_at: None,
            progress: 0.0,
            artifact_size_bytes: None,
            error: None,
            logs: Vec::new(),
        }
    }

    pub fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
    }

    pub fn mark_success(&mut self, artifact_size_bytes: u64) {
        self.status = ExecutionStatus::Success;
        self.progress = 1.0;
        self.artifact_size_bytes = Some(artifact_size_bytes);
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: BackhaulError) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = ExecutionStatus::Cancelled;
        self.error = Some(BackhaulError::cancelled("execution cancelled"));
        self.finished_at = Some(Utc::now());
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_execution_starts_queued_with_zero_progress() {
        let exec = Execution::new_queued(JobId::new(), ExecutionKind::Backup);
        assert_eq!(exec.status, ExecutionStatus::Queued);
        assert_eq!(exec.progress, 0.0);
        assert!(!exec.status.is_terminal());
    }

    #[test]
    fn success_sets_full_progress_and_finish_time() {
        let mut exec = Execution::new_queued(JobId::new(), ExecutionKind::Backup);
        exec.mark_running();
        exec.mark_success(4096);
        assert_eq!(exec.status, ExecutionStatus::Success);
        assert_eq!(exec.progress, 1.0);
        assert!(exec.finished_at.is_some());
        assert!(exec.status.is_terminal());
    }

    #[test]
    fn failure_records_error_and_terminal_status() {
        let mut exec = Execution::new_queued(JobId::new(), ExecutionKind::Restore);
        exec.mark_failed(BackhaulError::integrity("checksum mismatch"));
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert!(exec.error.is_some());
        assert!(exec.status.is_terminal());
    }
}
