use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;

/// When unattended cycles run. Expressions use the six-field form
/// `sec min hour day-of-month month day-of-week`.
#[derive(Debug, Clone)]
pub struct CycleSchedule {
    expr: String,
    schedule: CronSchedule,
}

impl CycleSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let schedule = CronSchedule::from_str(expr)
            .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", expr, e))?;
        Ok(Self {
            expr: expr.to_string(),
            schedule,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    /// Fire times within the next `hours`, for dry runs.
    pub fn preview(&self, now: DateTime<Utc>, hours: u64) -> Vec<DateTime<Utc>> {
        let end = now + chrono::Duration::hours(hours as i64);
        self.schedule.after(&now).take_while(|t| *t <= end).collect()
    }
}
