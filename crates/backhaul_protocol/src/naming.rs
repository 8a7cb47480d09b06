//! Path and name conventions shared by the runner and retention planner
//! (spec §4.5): sanitized job names, temp paths, and remote layout.

use chrono::{DateTime, Utc};

/// Collapses anything outside `[A-Za-z0-9]` to `_` (spec §6 artifact
/// layout), so a job's display name is always safe to embed in a
/// filesystem path or remote key.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_underscore = false;
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "job".to_string()
    } else {
        trimmed.to_string()
    }
}

/// The dump stage's unique temp file basename:
/// `{sanitized-job-name}_{ISO-timestamp}.{extension}`.
pub fn temp_file_name(job_name: &str, started_at: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        sanitize_name(job_name),
        started_at.format("%Y%m%dT%H%M%SZ"),
        extension
    )
}

/// Remote directory an artifact lives under: `backups/{sanitized-job-name}`.
pub fn remote_job_dir(job_name: &str) -> String {
    format!("backups/{}", sanitize_name(job_name))
}

/// Full remote path for an artifact given its temp-file basename.
pub fn remote_artifact_path(job_name: &str, basename: &str) -> String {
    format!("{}/{}", remote_job_dir(job_name), basename)
}

/// Sidecar path for a given artifact path: `<file>.meta.json`.
pub fn sidecar_path(artifact_remote_path: &str) -> String {
    format!("{artifact_remote_path}.meta.json")
}

/// Human label for the `databases` sidecar field given a database count
/// (spec §4.5 step 2: `Single DB`, `N DBs`, `All DBs`, or `Unknown`).
pub fn databases_label(count: Option<u32>, all_selected: bool) -> String {
    match (count, all_selected) {
        (_, true) => "All DBs".to_string(),
        (Some(1), false) => "Single DB".to_string(),
        (Some(n), false) => format!("{n} DBs"),
        (None, false) => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sanitize_name_collapses_unsafe_characters() {
        assert_eq!(sanitize_name("Nightly Orders / EU"), "Nightly_Orders_EU");
        assert_eq!(sanitize_name("  "), "job");
        assert_eq!(sanitize_name("simple_name.v2"), "simple_name_v2");
    }

    #[test]
    fn sanitize_name_never_produces_leading_or_trailing_underscores() {
        assert_eq!(sanitize_name("***weird***"), "weird");
    }

    #[test]
    fn temp_file_name_embeds_iso_timestamp() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 5, 3, 4, 5).unwrap();
        let name = temp_file_name("Nightly Orders", ts, "sql");
        assert_eq!(name, "Nightly_Orders_20260105T030405Z.sql");
    }

    #[test]
    fn remote_paths_follow_the_backups_prefix_convention() {
        assert_eq!(remote_job_dir("Orders"), "backups/Orders");
        assert_eq!(
            remote_artifact_path("Orders", "dump.sql.gz"),
            "backups/Orders/dump.sql.gz"
        );
        assert_eq!(
            sidecar_path("backups/Orders/dump.sql.gz"),
            "backups/Orders/dump.sql.gz.meta.json"
        );
    }

    #[test]
    fn databases_label_matches_spec_cases() {
        assert_eq!(databases_label(None, true), "All DBs");
        assert_eq!(databases_label(Some(1), false), "Single DB");
        assert_eq!(databases_label(Some(3), false), "3 DBs");
        assert_eq!(databases_label(None, false), "Unknown");
    }
}
