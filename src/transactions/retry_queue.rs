// Failed transaction retry queue
//
// Transactions whose validation failed wait here for another attempt. Each
// entry carries a retry counter and the time of its last failure; entries are
// dropped once retries run out or they age past the configured limit.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::database::{DatabaseManager, FailedTransaction, TransactionValidation};

/// What `add_or_bump` did with a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// First failure, entry created with `retry_count = 0`
    Queued,
    /// Existing entry updated
    Bumped { retry_count: u32 },
    /// Retries exhausted, entry removed
    Abandoned,
}

pub struct RetryQueue {
    db: Arc<DatabaseManager>,
    entries: Mutex<HashMap<String, FailedTransaction>>,
    max_retry_count: u32,
    max_age: Duration,
}

impl RetryQueue {
    pub fn new(db: Arc<DatabaseManager>, max_retry_count: u32, max_age: Duration) -> Result<Self> {
        let entries: HashMap<String, FailedTransaction> = db
            .get_failed_transactions()?
            .into_iter()
            .map(|f| (f.transaction_id.clone(), f))
            .collect();

        log::info!("Loaded {} failed transactions", entries.len());

        Ok(Self {
            db,
            entries: Mutex::new(entries),
            max_retry_count,
            max_age,
        })
    }

    fn lock_entries(&self) -> Result<MutexGuard<'_, HashMap<String, FailedTransaction>>> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock retry queue: {}", e))
    }

    /// Record a failed validation attempt
    pub fn add_or_bump(&self, validation: &TransactionValidation, now: DateTime<Utc>) -> Result<RetryOutcome> {
        let mut entries = self.lock_entries()?;
        let key = validation.transaction_id.as_str();

        let Some(existing) = entries.get(key).cloned() else {
            let entry = FailedTransaction::from_validation(validation, now);
            self.db.save_failed_transaction(&entry)?;
            entries.insert(key.to_string(), entry);
            log::info!("Queued failed transaction {} for retry", key);
            return Ok(RetryOutcome::Queued);
        };

        let retry_count = existing.retry_count.saturating_add(1);
        if retry_count >= self.max_retry_count {
            self.db.delete_failed_transaction(key)?;
            entries.remove(key);
            log::warn!(
                "Abandoning transaction {} after {} retries",
                key, retry_count
            );
            return Ok(RetryOutcome::Abandoned);
        }

        let mut updated = existing;
        updated.retry_count = retry_count;
        updated.failed_at = now;
        self.db.save_failed_transaction(&updated)?;
        entries.insert(key.to_string(), updated);

        log::debug!("Transaction {} failed again (retry {})", key, retry_count);
        Ok(RetryOutcome::Bumped { retry_count })
    }

    /// Drop an entry after a successful retry. Returns whether it was queued.
    pub fn remove(&self, transaction_id: &str) -> Result<bool> {
        let mut entries = self.lock_entries()?;
        if entries.remove(transaction_id).is_none() {
            return Ok(false);
        }
        self.db.delete_failed_transaction(transaction_id)?;
        Ok(true)
    }

    /// Entries still under the retry limit, oldest failure first
    pub fn list_retryable(&self) -> Result<Vec<FailedTransaction>> {
        let entries = self.lock_entries()?;
        let mut retryable: Vec<FailedTransaction> = entries
            .values()
            .filter(|f| f.retry_count < self.max_retry_count)
            .cloned()
            .collect();
        retryable.sort_by(|a, b| a.failed_at.cmp(&b.failed_at));
        Ok(retryable)
    }

    /// Purge entries whose last failure is older than the max age, whatever
    /// their retry count. Returns the number purged.
    pub fn cleanup_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - self.max_age;
        let mut entries = self.lock_entries()?;

        let stale: Vec<String> = entries
            .values()
            .filter(|f| f.failed_at < cutoff)
            .map(|f| f.transaction_id.clone())
            .collect();

        for id in &stale {
            self.db.delete_failed_transaction(id)?;
            entries.remove(id);
        }

        if !stale.is_empty() {
            log::info!("Purged {} stale failed transactions", stale.len());
        }
        Ok(stale.len())
    }

    pub fn contains(&self, transaction_id: &str) -> Result<bool> {
        Ok(self.lock_entries()?.contains_key(transaction_id))
    }

    pub fn get(&self, transaction_id: &str) -> Result<Option<FailedTransaction>> {
        Ok(self.lock_entries()?.get(transaction_id).cloned())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.lock_entries()?.len())
    }
}
