//! Core configuration
//!
//! Retention windows, retry bounds and background cadence. The retention
//! windows double as the idempotency horizon: a completed transaction id is
//! forgotten after `completed_retention`, which is only safe because the
//! store never reissues an id within that window.

use anyhow::{bail, Result};
use chrono::Duration;

pub const DEFAULT_COMPLETED_RETENTION_DAYS: i64 = 90;
pub const DEFAULT_FAILED_MAX_AGE_DAYS: i64 = 7;
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 3;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60 * 60;
/// Upper bound for stored day counts; larger values are treated as malformed
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Settings-table keys for each config value
pub mod keys {
    pub const COMPLETED_RETENTION_DAYS: &str = "completed_retention_days";
    pub const FAILED_MAX_AGE_DAYS: &str = "failed_max_age_days";
    pub const MAX_RETRY_COUNT: &str = "max_retry_count";
    pub const SYNC_INTERVAL_SECS: &str = "sync_interval_secs";
    pub const CLEANUP_INTERVAL_SECS: &str = "cleanup_interval_secs";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// How long a completed transaction id is remembered
    pub completed_retention: Duration,
    /// Failed transactions older than this are purged regardless of retries
    pub failed_max_age: Duration,
    /// Retry count at which a failed transaction is abandoned
    pub max_retry_count: u32,
    pub sync_interval: std::time::Duration,
    pub cleanup_interval: std::time::Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            completed_retention: Duration::days(DEFAULT_COMPLETED_RETENTION_DAYS),
            failed_max_age: Duration::days(DEFAULT_FAILED_MAX_AGE_DAYS),
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            sync_interval: std::time::Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            cleanup_interval: std::time::Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl CoreConfig {
    /// Retention windows are persisted as whole days and intervals as whole
    /// seconds, so anything finer would be truncated on save.
    pub fn validate(&self) -> Result<()> {
        check_whole_days("completed_retention", self.completed_retention)?;
        check_whole_days("failed_max_age", self.failed_max_age)?;
        if self.max_retry_count == 0 {
            bail!("max_retry_count must be > 0");
        }
        check_whole_seconds("sync_interval", self.sync_interval)?;
        check_whole_seconds("cleanup_interval", self.cleanup_interval)?;
        Ok(())
    }
}

fn check_whole_days(name: &str, value: Duration) -> Result<()> {
    if value < Duration::days(1) {
        bail!("{} must be at least one day", name);
    }
    if value.num_days() > MAX_RETENTION_DAYS {
        bail!("{} must be at most {} days", name, MAX_RETENTION_DAYS);
    }
    if value != Duration::days(value.num_days()) {
        bail!("{} must be a whole number of days", name);
    }
    Ok(())
}

fn check_whole_seconds(name: &str, value: std::time::Duration) -> Result<()> {
    if value.as_secs() == 0 {
        bail!("{} must be at least one second", name);
    }
    if value.subsec_nanos() != 0 {
        bail!("{} must be a whole number of seconds", name);
    }
    Ok(())
}
