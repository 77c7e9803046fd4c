// Database Manager for meeting-sync
// Owns the SQLite connection that backs the local replica and the transaction ledgers

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction};
use std::path::PathBuf;
use std::sync::Mutex;

use super::migrations;

/// Database manager that owns the SQLite connection.
///
/// Every read and write goes through the connection mutex, which is what
/// serializes job-progress updates against sync passes.
pub struct DatabaseManager {
    conn: Mutex<Connection>,
}

impl DatabaseManager {
    /// Create a new DatabaseManager with the database at the specified path
    pub fn new(db_path: PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create database directory")?;
        }

        let conn = Connection::open(&db_path)
            .context("Failed to open database")?;

        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;

        migrations::run_migrations(&conn)
            .context("Failed to run database migrations")?;

        log::info!("Database initialized at: {:?}", db_path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Execute a function with access to the database connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock database connection: {}", e))?;
        f(&conn)
    }

    /// Execute a function inside a single SQLite transaction.
    ///
    /// The transaction commits only if `f` returns `Ok`; any error rolls back
    /// every statement `f` ran.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()
                .context("Failed to start transaction")?;
            let value = f(&tx)?;
            tx.commit().context("Failed to commit transaction")?;
            Ok(value)
        })
    }
}

/// `<data dir>/meeting-local/meetsync.db`, falling back to the working directory.
/// Hosts pass this to `AppState::initialize` when they have no path of their own.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meeting-local")
        .join("meetsync.db")
}
