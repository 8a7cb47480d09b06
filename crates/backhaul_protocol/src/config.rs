//! Process-wide settings shared by every binary and background task.
//! Read from the environment with plain `std::env`, mirroring the donor
//! project's `SentinelArgs`-style defaults-as-constants approach, but
//! environment-driven since this config crosses into library crates that
//! never parse CLI args directly.

use std::env;
use std::time::Duration;

use crate::error::BackhaulError;

/// Default bind address for the job-trigger HTTP API (spec §6).
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8088";

/// Default execution-store database URL: a local SQLite file.
pub const DEFAULT_STORE_URL: &str = "sqlite://backhaul.db";

/// Default global concurrency cap (spec §4.6).
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

/// Env var carrying the system master key (spec §4.10), hex-encoded,
/// 32 bytes. Never logged.
pub const MASTER_KEY_ENV: &str = "BACKHAUL_MASTER_KEY";

/// Process-wide configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub store_url: String,
    pub max_concurrent_runs: usize,
    /// Per-job deadline; `None` means unlimited (spec §5 default).
    pub default_job_deadline: Option<Duration>,
    pub log_level: String,
}

impl Settings {
    /// Reads every field from its environment variable, falling back to
    /// the documented default. Does not read the master key itself — that
    /// is loaded separately by `backhaul_security` so it never sits next
    /// to unrelated settings in logs or debug output.
    pub fn from_env() -> Result<Self, BackhaulError> {
        let bind_addr = env::var("BACKHAUL_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let store_url = env::var("BACKHAUL_STORE_URL").unwrap_or_else(|_| DEFAULT_STORE_URL.to_string());
        let max_concurrent_runs = match env::var("BACKHAUL_MAX_CONCURRENT_RUNS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| BackhaulError::config_invalid(format!(
                    "BACKHAUL_MAX_CONCURRENT_RUNS must be a positive integer, got {raw:?}"
                )))?,
            Err(_) => DEFAULT_MAX_CONCURRENT_RUNS,
        };
        let default_job_deadline = match env::var("BACKHAUL_JOB_DEADLINE_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    BackhaulError::config_invalid(format!(
                        "BACKHAUL_JOB_DEADLINE_SECS must be a positive integer, got {raw:?}"
                    ))
                })?;
                Some(Duration::from_secs(secs))
            }
            Err(_) => None,
        };
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        if max_concurrent_runs == 0 {
            return Err(BackhaulError::config_invalid(
                "BACKHAUL_MAX_CONCURRENT_RUNS must be at least 1",
            ));
        }

        Ok(Self {
            bind_addr,
            store_url,
            max_concurrent_runs,
            default_job_deadline,
            log_level,
        })
    }
}
