//! The `Reporter` capability (spec §9 REDESIGN FLAGS: "callback-shaped
//! progress and log sinks" collapsed into a single context-carried trait).
//! Adapters call `log`/`progress` without knowing whether the run is
//! accumulating logs for an execution row or streaming to the console.

use std::sync::Mutex;

use crate::execution::{LogEntry, LogLevel, LogType};

/// Sink adapters and runner stages report progress and structured log
/// lines through. Implementations must tolerate being called from any
/// stage at any time; they never fail the run on their own account.
pub trait Reporter: Send + Sync {
    fn log(&self, level: LogLevel, log_type: LogType, message: &str);

    /// `percent` in `[0.0, 1.0]`; `stage` names the current pipeline
    /// stage for display (spec §4.5).
    fn progress(&self, percent: f32, stage: &str);
}

/// Accumulates log entries in memory. Used by the runner to build the
/// final `logs` array persisted on the `Execution` row (spec §4.7).
#[derive(Default)]
pub struct BufferingReporter {
    entries: Mutex<Vec<LogEntry>>,
    last_progress: Mutex<(f32, String)>,
}

impl BufferingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains and returns everything logged so far, in insertion order.
    pub fn take_entries(&self) -> Vec<LogEntry> {
        std::mem::take(&mut self.entries.lock().unwrap())
    }

    pub fn last_progress(&self) -> (f32, String) {
        self.last_progress.lock().unwrap().clone()
    }
}

impl Reporter for BufferingReporter {
    fn log(&self, level: LogLevel, log_type: LogType, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(LogEntry::new(level, log_type, message));
    }

    fn progress(&self, percent: f32, stage: &str) {
        *self.last_progress.lock().unwrap() = (percent, stage.to_string());
    }
}

/// Forwards log lines and progress to `tracing`, for live visibility
/// while a run is in flight. Stacks with `BufferingReporter` via
/// `CompositeReporter` when both are wanted.
#[derive(Default)]
pub struct TracingReporter;

impl TracingReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for TracingReporter {
    fn log(&self, level: LogLevel, log_type: LogType, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(stage = ?log_type, "{message}"),
            LogLevel::Info => tracing::info!(stage = ?log_type, "{message}"),
            LogLevel::Warn => tracing::warn!(stage = ?log_type, "{message}"),
            LogLevel::Error => tracing::error!(stage = ?log_type, "{message}"),
        }
    }

    fn progress(&self, percent: f32, stage: &str) {
        tracing::debug!(percent = percent * 100.0, stage, "progress");
    }
}

/// Fans out to two reporters at once; the runner uses this to buffer for
/// persistence while also streaming to the console.
pub struct CompositeReporter<A, B> {
    pub first: A,
    pub second: B,
}

impl<T: Reporter + ?Sized> Reporter for &T {
    fn log(&self, level: LogLevel, log_type: LogType, message: &str) {
        (**self).log(level, log_type, message);
    }

    fn progress(&self, percent: f32, stage: &str) {
        (**self).progress(percent, stage);
    }
}

impl<A: Reporter, B: Reporter> Reporter for CompositeReporter<A, B> {
    fn log(&self, level: LogLevel, log_type: LogType, message: &str) {
        self.first.log(level, log_type, message);
        self.second.log(level, log_type, message);
    }

    fn progress(&self, percent: f32, stage: &str) {
        self.first.progress(percent, stage);
        self.second.progress(percent, stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffering_reporter_preserves_insertion_order() {
        let reporter = BufferingReporter::new();
        reporter.log(LogLevel::Info, LogType::Dump, "starting dump");
        reporter.log(LogLevel::Info, LogType::Upload, "uploading");
        let entries = reporter.take_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "starting dump");
        assert_eq!(entries[1].message, "uploading");
    }

    #[test]
    fn take_entries_drains_the_buffer() {
        let reporter = BufferingReporter::new();
        reporter.log(LogLevel::Info, LogType::Dump, "one");
        assert_eq!(reporter.take_entries().len(), 1);
        assert_eq!(reporter.take_entries().len(), 0);
    }

    #[test]
    fn progress_tracks_latest_call() {
        let reporter = BufferingReporter::new();
        reporter.progress(0.5, "dump");
        reporter.progress(0.9, "upload");
        assert_eq!(reporter.last_progress(), (0.9, "upload".to_string()));
    }

    #[test]
    fn composite_reporter_forwards_to_both() {
        let buffering = BufferingReporter::new();
        let composite = CompositeReporter {
            first: &buffering,
            second: TracingReporter::new(),
        };
        composite.log(LogLevel::Warn, LogType::Retention, "pruning");
        assert_eq!(buffering.take_entries().len(), 1);
    }
}
