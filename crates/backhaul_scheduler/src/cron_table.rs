//! The `jobId -> CronSpec` mapping (spec §4.6), rebuilt wholesale from
//! persistence at boot and on every `reload()`.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

use crate::error::SchedulerError;

/// A parsed cron expression plus the logic deciding whether it fired since
/// the scheduler's last tick.
#[derive(Clone)]
pub struct CronSpec {
    expression: String,
    schedule: Schedule,
}

impl CronSpec {
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let schedule = Schedule::from_str(expression)
            .map_err(|err| SchedulerError::invalid_cron(expression, err.to_string()))?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// True if this schedule has a fire time in `(now - lookback, now]`.
    /// `lookback` is normally the tick interval: wider and a tick re-fires
    /// a schedule the previous tick already handled; narrower and a fire
    /// landing exactly on a tick boundary could be missed.
    pub fn should_fire(&self, now: DateTime<Utc>, lookback: Duration) -> bool {
        match self.schedule.after(&(now - lookback)).next() {
            Some(fire_at) => fire_at <= now,
            None => false,
        }
    }

    /// Next fire time strictly after `now`, used for diagnostics (not
    /// persisted: the scheduler derives `nextRun` on demand, spec §4.6).
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_malformed_expression() {
        assert!(CronSpec::parse("not a cron expression").is_err());
    }

    #[test]
    fn fires_within_the_lookback_window() {
        let spec = CronSpec::parse("0 * * * * *").unwrap(); // every minute, on the minute
        let now = "2026-01-01T12:05:00Z".parse::<DateTime<Utc>>().unwrap();
        assert!(spec.should_fire(now, Duration::minutes(1)));

        let just_missed = "2026-01-01T12:05:59Z".parse::<DateTime<Utc>>().unwrap();
        assert!(!spec.should_fire(just_missed, Duration::minutes(1)));
    }

    #[test]
    fn does_not_fire_outside_the_window() {
        let spec = CronSpec::parse("0 0 0 1 1 *").unwrap(); // once a year, Jan 1st
        let now = "2026-06-15T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert!(!spec.should_fire(now, Duration::minutes(1)));
    }
}
