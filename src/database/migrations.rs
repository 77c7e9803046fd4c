// Database migrations for meeting-sync
// Creates and updates the database schema

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current schema version
const SCHEMA_VERSION: i32 = 2;

/// Run all necessary migrations to bring the database up to date
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    log::debug!("Database schema at version {}", SCHEMA_VERSION);
    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    ).context("Failed to check for schema_version table")?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    ).context("Failed to read schema version")?;

    Ok(version.unwrap_or(0))
}

/// Initial schema creation (version 1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    log::info!("Running database migration v1");

    conn.execute_batch(r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Settings table: Key-value store for configuration and sync bookkeeping
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL,
            value_type TEXT NOT NULL DEFAULT 'string',
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Meetings table: Local replica of server meetings.
        -- is_processing is derived from processing_state and has no column.
        CREATE TABLE IF NOT EXISTS meetings (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            location TEXT,
            notes TEXT,
            duration_seconds REAL,
            date_created TEXT NOT NULL,
            date_modified TEXT NOT NULL,
            processing_state TEXT NOT NULL DEFAULT 'pending',
            processing_error TEXT,
            last_processed_chunk INTEGER NOT NULL DEFAULT 0,
            total_chunks INTEGER NOT NULL DEFAULT 0,
            transcript TEXT,
            short_summary TEXT,
            long_summary TEXT,
            audio_file_path TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_meetings_date_created
        ON meetings(date_created DESC);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
    "#).context("Failed to run migration v1")?;

    log::info!("Migration v1 completed successfully");
    Ok(())
}

/// Purchase transaction ledgers (version 2)
fn migrate_v2(conn: &Connection) -> Result<()> {
    log::info!("Running database migration v2 - Transaction ledgers");

    conn.execute_batch(r#"
        -- Transactions the server has acknowledged (dedup set)
        CREATE TABLE IF NOT EXISTS completed_transactions (
            transaction_id TEXT PRIMARY KEY NOT NULL,
            completed_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_completed_transactions_completed_at
        ON completed_transactions(completed_at);

        -- Transactions whose validation failed and may be retried
        CREATE TABLE IF NOT EXISTS failed_transactions (
            transaction_id TEXT PRIMARY KEY NOT NULL,
            original_transaction_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            environment TEXT NOT NULL,
            failed_at TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0
        );

        -- Record migration
        INSERT INTO schema_version (version) VALUES (2);
    "#).context("Failed to run migration v2")?;

    log::info!("Migration v2 completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_migrations() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let conn = Connection::open(&db_path).unwrap();

        run_migrations(&conn).unwrap();

        let version: i32 = conn.query_row(
            "SELECT MAX(version) FROM schema_version",
            [],
            |row| row.get(0),
        ).unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let tables: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
             AND name IN ('meetings', 'settings', 'completed_transactions', 'failed_transactions')",
            [],
            |row| row.get(0),
        ).unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        let conn = Connection::open(dir.path().join("test.db")).unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let rows: i32 = conn.query_row(
            "SELECT COUNT(*) FROM schema_version",
            [],
            |row| row.get(0),
        ).unwrap();
        assert_eq!(rows, 2);
    }
}
