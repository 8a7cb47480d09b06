//! `RunnerContext`: the mutable state threaded through a single pipeline
//! run (spec §4.5). One context is built per execution and discarded when
//! it finishes; nothing here outlives the run.

use std::path::PathBuf;

use backhaul_protocol::{
    CancellationToken, CompositeReporter, DatabasesLabel, Destination, EncryptionProfile,
    Execution, Job, LogEntry, LogLevel, LogType, Reporter, Source,
};
use backhaul_security::SecretStore;

/// Everything a single backup or restore run needs, gathered once during
/// the Resolve stage and mutated in place by every stage after it.
pub struct RunnerContext<'a> {
    pub job: Job,
    pub source: Source,
    pub destination: Destination,
    pub profile: Option<EncryptionProfile>,
    pub execution: Execution,
    pub reporter: CompositeReporter<backhaul_protocol::BufferingReporter, backhaul_protocol::TracingReporter>,
    pub secret_store: &'a SecretStore,
    pub cancel: CancellationToken,
    /// Local path of the artifact currently being worked on. Reassigned as
    /// compression/encryption append extensions; always deleted at Finalize.
    pub temp_path: Option<PathBuf>,
    pub remote_path: Option<String>,
    pub bytes: Option<u64>,
    pub databases_label: Option<DatabasesLabel>,
}

impl<'a> RunnerContext<'a> {
    pub fn log(&self, level: LogLevel, log_type: LogType, message: impl Into<String>) {
        let message = message.into();
        self.reporter.log(level, log_type, &message);
    }

    pub fn progress(&self, percent: f32, stage: &str) {
        self.reporter.progress(percent, stage);
    }

    /// Drains the buffering half of the reporter into the execution's log
    /// array. Called once, at Finalize.
    pub fn drain_logs_into_execution(&mut self) {
        let entries: Vec<LogEntry> = self.reporter.first.take_entries();
        for entry in entries {
            self.execution.push_log(entry);
        }
    }
}
