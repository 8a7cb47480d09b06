//! `RetentionReport`: a logging-friendly summary over a `Plan`, analogous
//! to the nearest production example's `retention::RetentionReport`. Does
//! not change `plan()`'s pure-function contract — the runner builds one
//! of these from a `Plan` purely to log what retention did.

use crate::plan::{Plan, RetentionReason};

#[derive(Debug, Clone, Default)]
pub struct RetentionReport {
    pub kept_count: usize,
    pub deleted_count: usize,
    pub locked_count: usize,
    pub deleted_paths: Vec<String>,
}

impl<'a> From<&Plan<'a>> for RetentionReport {
    fn from(plan: &Plan<'a>) -> Self {
        let mut report = RetentionReport::default();
        for decision in &plan.decisions {
            if matches!(decision.reason, RetentionReason::Locked) {
                report.locked_count += 1;
            }
            if decision.keep {
                report.kept_count += 1;
            } else {
                report.deleted_count += 1;
                report.deleted_paths.push(decision.artifact.remote_path.clone());
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::plan;
    use backhaul_protocol::{Artifact, RetentionPolicy};
    use chrono::{TimeZone, Utc};

    #[test]
    fn report_counts_match_plan_decisions() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let artifacts = vec![
            Artifact {
                remote_path: "a".into(),
                size_bytes: 1,
                last_modified: now,
                sidecar: None,
            },
            Artifact {
                remote_path: "b".into(),
                size_bytes: 1,
                last_modified: now - chrono::Duration::days(1),
                sidecar: None,
            },
        ];
        let result = plan(&artifacts, &RetentionPolicy::Simple { keep_count: 1 }, now);
        let report = RetentionReport::from(&result);
        assert_eq!(report.kept_count, 1);
        assert_eq!(report.deleted_count, 1);
        assert_eq!(report.deleted_paths, vec!["b".to_string()]);
    }
}
