// Database module for meeting-sync
// Provides SQLite persistence for meetings, transaction ledgers and settings

pub mod manager;
pub mod migrations;
pub mod models;
pub mod settings_repo;
pub mod meetings_repo;
pub mod transactions_repo;

pub use manager::{default_db_path, DatabaseManager};
pub use models::*;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

/// Read an RFC 3339 timestamp column
pub(crate) fn get_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Format a timestamp for storage
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
