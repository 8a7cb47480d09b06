//! The three pure condition checks (spec §4.9). Each takes the
//! destination's snapshot history ordered newest-first.

use chrono::{DateTime, Duration, Utc};

use backhaul_protocol::StorageSnapshot;

/// |Δsize / previous| ≥ `spike_percent`, comparing the two most recent
/// snapshots. Fewer than two snapshots, or a previous size of zero,
/// never spikes — there's nothing to compare against.
pub fn usage_spike(history_newest_first: &[StorageSnapshot], spike_percent: f64) -> bool {
    let [latest, previous, ..] = history_newest_first else {
        return false;
    };
    if previous.total_size_bytes == 0 {
        return false;
    }
    let delta = (latest.total_size_bytes as f64 - previous.total_size_bytes as f64).abs();
    delta / previous.total_size_bytes as f64 >= spike_percent
}

/// `currentSize / configuredLimit ≥ 0.9`, against the newest snapshot.
pub fn storage_limit_exceeded(history_newest_first: &[StorageSnapshot], limit_bytes: u64) -> bool {
    let Some(latest) = history_newest_first.first() else {
        return false;
    };
    if limit_bytes == 0 {
        return true;
    }
    latest.total_size_bytes as f64 / limit_bytes as f64 >= 0.9
}

/// Walks newest-first to find the most recent point where `fileCount`
/// changed between adjacent snapshots; alerts once `now` is at least
/// `missing_after_hours` past that point. If the count never changes
/// across the whole retained history, the oldest snapshot we have is
/// the closest thing to "the last time it changed" we can observe.
pub fn missing_backup(
    history_newest_first: &[StorageSnapshot],
    now: DateTime<Utc>,
    missing_after_hours: i64,
) -> bool {
    let Some(oldest) = history_newest_first.last() else {
        return false;
    };
    let mut last_change_at = oldest.captured_at;
    for pair in history_newest_first.windows(2) {
        let (newer, older) = (&pair[0], &pair[1]);
        if newer.file_count != older.file_count {
            last_change_at = newer.captured_at;
            break;
        }
    }
    now.signed_duration_since(last_change_at) >= Duration::hours(missing_after_hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(bytes: u64, files: u64, captured_at: &str) -> StorageSnapshot {
        StorageSnapshot {
            destination_id: backhaul_protocol::DestinationId::new(),
            total_size_bytes: bytes,
            file_count: files,
            captured_at: captured_at.parse().unwrap(),
        }
    }

    #[test]
    fn spike_fires_when_delta_crosses_the_threshold() {
        let history = vec![
            snapshot(1_600, 10, "2026-01-02T00:00:00Z"),
            snapshot(1_000, 10, "2026-01-01T00:00:00Z"),
        ];
        assert!(usage_spike(&history, 0.5));
        assert!(!usage_spike(&history, 0.9));
    }

    #[test]
    fn spike_needs_at_least_two_snapshots() {
        let history = vec![snapshot(1_000, 10, "2026-01-01T00:00:00Z")];
        assert!(!usage_spike(&history, 0.1));
    }

    #[test]
    fn storage_limit_fires_at_ninety_percent() {
        let history = vec![snapshot(900, 10, "2026-01-01T00:00:00Z")];
        assert!(storage_limit_exceeded(&history, 1_000));
        assert!(!storage_limit_exceeded(&history, 2_000));
    }

    #[test]
    fn missing_backup_fires_once_the_window_since_last_change_elapses() {
        let history = vec![
            snapshot(1_000, 12, "2026-01-03T00:00:00Z"),
            snapshot(1_000, 12, "2026-01-02T00:00:00Z"),
            snapshot(1_000, 10, "2026-01-01T00:00:00Z"),
        ];
        let now: DateTime<Utc> = "2026-01-03T20:00:00Z".parse().unwrap();
        assert!(!missing_backup(&history, now, 24));

        let later: DateTime<Utc> = "2026-01-04T01:00:00Z".parse().unwrap();
        assert!(missing_backup(&history, later, 24));
    }

    #[test]
    fn missing_backup_uses_the_oldest_snapshot_when_count_never_changes() {
        let history = vec![
            snapshot(1_000, 10, "2026-01-03T00:00:00Z"),
            snapshot(1_000, 10, "2026-01-02T00:00:00Z"),
            snapshot(1_000, 10, "2026-01-01T00:00:00Z"),
        ];
        let now: DateTime<Utc> = "2026-01-03T01:00:00Z".parse().unwrap();
        assert!(missing_backup(&history, now, 24));
    }
}
