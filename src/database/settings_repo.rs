// Settings repository for meeting-sync
// Handles key-value settings: core configuration and sync bookkeeping

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::DatabaseManager;
use crate::config::{keys, CoreConfig, MAX_RETENTION_DAYS};

/// Settings key holding the completion time of the last successful sync pass
pub const LAST_SYNC_DATE_KEY: &str = "last_sync_date";

impl DatabaseManager {
    /// Get a single setting by key
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            get_setting_impl(conn, key)
        })
    }

    /// Set a single setting
    pub fn set_setting(&self, key: &str, value: &str, value_type: &str) -> Result<()> {
        self.with_connection(|conn| {
            set_setting_impl(conn, key, value, value_type)
        })
    }

    /// Delete a setting by key
    pub fn delete_setting(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| {
            delete_setting_impl(conn, key)
        })
    }

    /// Load the core configuration. Missing, malformed or out-of-range values
    /// fall back to their defaults one key at a time.
    pub fn load_core_config(&self) -> Result<CoreConfig> {
        self.with_connection(|conn| {
            load_core_config_impl(conn)
        })
    }

    /// Persist every core configuration value
    pub fn save_core_config(&self, config: &CoreConfig) -> Result<()> {
        config.validate()?;
        self.with_transaction(|tx| {
            set_setting_impl(
                tx,
                keys::COMPLETED_RETENTION_DAYS,
                &config.completed_retention.num_days().to_string(),
                "integer",
            )?;
            set_setting_impl(
                tx,
                keys::FAILED_MAX_AGE_DAYS,
                &config.failed_max_age.num_days().to_string(),
                "integer",
            )?;
            set_setting_impl(
                tx,
                keys::MAX_RETRY_COUNT,
                &config.max_retry_count.to_string(),
                "integer",
            )?;
            set_setting_impl(
                tx,
                keys::SYNC_INTERVAL_SECS,
                &config.sync_interval.as_secs().to_string(),
                "integer",
            )?;
            set_setting_impl(
                tx,
                keys::CLEANUP_INTERVAL_SECS,
                &config.cleanup_interval.as_secs().to_string(),
                "integer",
            )?;
            Ok(())
        })
    }

    /// When the last sync pass committed, if ever
    pub fn get_last_sync_date(&self) -> Result<Option<DateTime<Utc>>> {
        self.with_connection(|conn| {
            get_last_sync_date_impl(conn)
        })
    }
}

pub(crate) fn get_setting_impl(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare(
        "SELECT value FROM settings WHERE key = ?"
    ).context("Failed to prepare get_setting query")?;

    let result = stmt.query_row(params![key], |row| row.get(0));

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get setting"),
    }
}

pub(crate) fn set_setting_impl(conn: &Connection, key: &str, value: &str, value_type: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO settings (key, value, value_type, updated_at)
        VALUES (?1, ?2, ?3, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            value_type = excluded.value_type,
            updated_at = datetime('now')
        "#,
        params![key, value, value_type],
    ).context("Failed to set setting")?;

    Ok(())
}

fn load_core_config_impl(conn: &Connection) -> Result<CoreConfig> {
    let mut config = CoreConfig::default();

    let mut stmt = conn.prepare(
        "SELECT key, value FROM settings"
    ).context("Failed to prepare load_core_config query")?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
        ))
    }).context("Failed to query settings")?;

    for row in rows {
        let (key, value) = row.context("Failed to read setting row")?;

        match key.as_str() {
            keys::COMPLETED_RETENTION_DAYS => {
                if let Some(days) = parse_days(&key, &value) {
                    config.completed_retention = chrono::Duration::days(days);
                }
            }
            keys::FAILED_MAX_AGE_DAYS => {
                if let Some(days) = parse_days(&key, &value) {
                    config.failed_max_age = chrono::Duration::days(days);
                }
            }
            keys::MAX_RETRY_COUNT => {
                if let Some(count) = parse_positive::<u32>(&key, &value) {
                    config.max_retry_count = count;
                }
            }
            keys::SYNC_INTERVAL_SECS => {
                if let Some(secs) = parse_positive::<u64>(&key, &value) {
                    config.sync_interval = std::time::Duration::from_secs(secs);
                }
            }
            keys::CLEANUP_INTERVAL_SECS => {
                if let Some(secs) = parse_positive::<u64>(&key, &value) {
                    config.cleanup_interval = std::time::Duration::from_secs(secs);
                }
            }
            _ => {
                log::debug!("Ignoring non-config setting key: {}", key);
            }
        }
    }

    Ok(config)
}

fn parse_days(key: &str, value: &str) -> Option<i64> {
    let days = parse_positive::<i64>(key, value)?;
    if days > MAX_RETENTION_DAYS {
        log::warn!("Value {} for setting {} exceeds {} days, using default", days, key, MAX_RETENTION_DAYS);
        return None;
    }
    Some(days)
}

/// Parse a strictly positive number; anything else warns and yields `None`
fn parse_positive<T>(key: &str, value: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default + std::fmt::Display,
{
    match value.trim().parse::<T>() {
        Ok(v) if v > T::default() => Some(v),
        Ok(v) => {
            log::warn!("Out-of-range value {} for setting {}, using default", v, key);
            None
        }
        Err(_) => {
            log::warn!("Invalid value '{}' for setting {}, using default", value, key);
            None
        }
    }
}

pub(crate) fn get_last_sync_date_impl(conn: &Connection) -> Result<Option<DateTime<Utc>>> {
    match get_setting_impl(conn, LAST_SYNC_DATE_KEY)? {
        Some(raw) => {
            let parsed = DateTime::parse_from_rfc3339(&raw)
                .with_context(|| format!("Invalid {} value: {}", LAST_SYNC_DATE_KEY, raw))?;
            Ok(Some(parsed.with_timezone(&Utc)))
        }
        None => Ok(None),
    }
}

pub(crate) fn set_last_sync_date_impl(conn: &Connection, when: &DateTime<Utc>) -> Result<()> {
    set_setting_impl(conn, LAST_SYNC_DATE_KEY, &when.to_rfc3339(), "datetime")
}

fn delete_setting_impl(conn: &Connection, key: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM settings WHERE key = ?",
        params![key],
    ).context("Failed to delete setting")?;

    Ok(())
}
