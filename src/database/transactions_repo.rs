// Transactions repository for meeting-sync
// Persists the completed (dedup) ledger and the failed (retry) ledger

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::models::{CompletedTransaction, Environment, FailedTransaction};
use super::{format_timestamp, get_timestamp, DatabaseManager};

impl DatabaseManager {
    /// Load every completed transaction
    pub fn get_completed_transactions(&self) -> Result<Vec<CompletedTransaction>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT transaction_id, completed_at FROM completed_transactions"
            ).context("Failed to prepare completed transactions query")?;

            let rows = stmt.query_map([], |row| {
                Ok(CompletedTransaction {
                    transaction_id: row.get(0)?,
                    completed_at: get_timestamp(row, 1)?,
                })
            }).context("Failed to query completed transactions")?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to collect completed transactions")
        })
    }

    /// Record a completed transaction, refreshing its timestamp if already present
    pub fn save_completed_transaction(&self, transaction_id: &str, completed_at: &DateTime<Utc>) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO completed_transactions (transaction_id, completed_at)
                VALUES (?1, ?2)
                ON CONFLICT(transaction_id) DO UPDATE SET completed_at = excluded.completed_at
                "#,
                params![transaction_id, format_timestamp(completed_at)],
            ).with_context(|| format!("Failed to save completed transaction {}", transaction_id))?;
            Ok(())
        })
    }

    /// Delete completed transactions recorded before `cutoff`. Returns how many were removed.
    pub fn delete_completed_before(&self, cutoff: &DateTime<Utc>) -> Result<usize> {
        // completed_at is RFC 3339 in UTC, so compare parsed values rather than text
        self.with_transaction(|tx| {
            let expired: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT transaction_id, completed_at FROM completed_transactions"
                ).context("Failed to prepare completed transactions query")?;

                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, get_timestamp(row, 1)?))
                }).context("Failed to query completed transactions")?;

                let mut ids = Vec::new();
                for row in rows {
                    let (id, completed_at) = row.context("Failed to read completed transaction")?;
                    if completed_at < *cutoff {
                        ids.push(id);
                    }
                }
                ids
            };

            for id in &expired {
                tx.execute(
                    "DELETE FROM completed_transactions WHERE transaction_id = ?",
                    params![id],
                ).with_context(|| format!("Failed to delete completed transaction {}", id))?;
            }

            Ok(expired.len())
        })
    }

    /// Load every failed transaction
    pub fn get_failed_transactions(&self) -> Result<Vec<FailedTransaction>> {
        self.with_connection(|conn| {
            get_failed_transactions_impl(conn)
        })
    }

    /// Insert or overwrite a failed transaction
    pub fn save_failed_transaction(&self, failed: &FailedTransaction) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO failed_transactions (
                    transaction_id, original_transaction_id, product_id,
                    environment, failed_at, retry_count
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(transaction_id) DO UPDATE SET
                    original_transaction_id = excluded.original_transaction_id,
                    product_id = excluded.product_id,
                    environment = excluded.environment,
                    failed_at = excluded.failed_at,
                    retry_count = excluded.retry_count
                "#,
                params![
                    failed.transaction_id,
                    failed.original_transaction_id,
                    failed.product_id,
                    failed.environment.as_str(),
                    format_timestamp(&failed.failed_at),
                    failed.retry_count,
                ],
            ).with_context(|| format!("Failed to save failed transaction {}", failed.transaction_id))?;
            Ok(())
        })
    }

    /// Remove a failed transaction. Returns whether a row existed.
    pub fn delete_failed_transaction(&self, transaction_id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let removed = conn.execute(
                "DELETE FROM failed_transactions WHERE transaction_id = ?",
                params![transaction_id],
            ).with_context(|| format!("Failed to delete failed transaction {}", transaction_id))?;
            Ok(removed > 0)
        })
    }
}

fn get_failed_transactions_impl(conn: &Connection) -> Result<Vec<FailedTransaction>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT transaction_id, original_transaction_id, product_id,
               environment, failed_at, retry_count
        FROM failed_transactions
        ORDER BY failed_at ASC
        "#
    ).context("Failed to prepare failed transactions query")?;

    let rows = stmt.query_map([], |row| {
        let environment: String = row.get(3)?;
        Ok(FailedTransaction {
            transaction_id: row.get(0)?,
            original_transaction_id: row.get(1)?,
            product_id: row.get(2)?,
            environment: Environment::from_str(&environment),
            failed_at: get_timestamp(row, 4)?,
            retry_count: row.get(5)?,
        })
    }).context("Failed to query failed transactions")?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect failed transactions")
}
