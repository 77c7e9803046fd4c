// Transaction dedup registry
//
// Tracks which purchase transactions the server has already validated
// (completed) and which are being validated right now (in flight), so the
// store listener and a restore flow never submit the same id twice.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::database::DatabaseManager;

pub struct TransactionRegistry {
    db: Arc<DatabaseManager>,
    /// Always locked before touching `in_flight`
    completed: Mutex<HashMap<String, DateTime<Utc>>>,
    in_flight: DashMap<String, DateTime<Utc>>,
    retention: Duration,
}

impl TransactionRegistry {
    /// Build the registry, loading the completed set from the database
    pub fn new(db: Arc<DatabaseManager>, retention: Duration) -> Result<Self> {
        let completed: HashMap<String, DateTime<Utc>> = db
            .get_completed_transactions()?
            .into_iter()
            .map(|t| (t.transaction_id, t.completed_at))
            .collect();

        log::info!("Loaded {} completed transactions", completed.len());

        Ok(Self {
            db,
            completed: Mutex::new(completed),
            in_flight: DashMap::new(),
            retention,
        })
    }

    fn lock_completed(&self) -> Result<MutexGuard<'_, HashMap<String, DateTime<Utc>>>> {
        self.completed
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock completed transactions: {}", e))
    }

    /// Atomically check that `key` is neither completed nor in flight and mark
    /// it in flight. Exactly one of any number of concurrent callers gets `true`.
    pub fn try_begin(&self, key: &str) -> Result<bool> {
        let completed = self.lock_completed()?;
        if completed.contains_key(key) {
            return Ok(false);
        }

        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                Ok(true)
            }
        }
    }

    pub fn is_processed_or_in_flight(&self, key: &str) -> Result<bool> {
        let completed = self.lock_completed()?;
        Ok(completed.contains_key(key) || self.in_flight.contains_key(key))
    }

    /// Mark `key` in flight without checking the completed set.
    /// Prefer [`try_begin`](Self::try_begin) when racing callers are possible.
    pub fn mark_in_flight(&self, key: &str) {
        self.in_flight.insert(key.to_string(), Utc::now());
    }

    pub fn is_processed(&self, key: &str) -> Result<bool> {
        Ok(self.lock_completed()?.contains_key(key))
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Finish an attempt. On success the key joins the completed set and is
    /// persisted; on failure it is simply released.
    pub fn complete_processing(&self, key: &str, success: bool) -> Result<()> {
        let mut completed = self.lock_completed()?;
        self.in_flight.remove(key);

        if !success {
            log::debug!("Transaction {} released after failed attempt", key);
            return Ok(());
        }

        // Memory only follows a successful write
        let now = Utc::now();
        if let Err(e) = self.db.save_completed_transaction(key, &now) {
            log::error!("Failed to persist completed transaction {}: {}", key, e);
            return Err(e);
        }
        completed.insert(key.to_string(), now);

        log::info!("Transaction {} completed", key);
        Ok(())
    }

    /// Forget completed transactions older than the retention window.
    /// Returns the number evicted.
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - self.retention;
        let mut completed = self.lock_completed()?;

        let before = completed.len();
        completed.retain(|_, completed_at| *completed_at >= cutoff);
        let evicted = before - completed.len();

        let removed = self.db.delete_completed_before(&cutoff)?;
        if removed != evicted {
            log::debug!(
                "Completed transaction cleanup: {} evicted in memory, {} rows deleted",
                evicted, removed
            );
        }

        if evicted > 0 {
            log::info!("Evicted {} completed transactions older than {}", evicted, cutoff);
        }
        Ok(evicted)
    }

    pub fn completed_count(&self) -> Result<usize> {
        Ok(self.lock_completed()?.len())
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn create_registry() -> (TempDir, Arc<DatabaseManager>, TransactionRegistry) {
        let dir = tempdir().unwrap();
        let db = Arc::new(DatabaseManager::new(dir.path().join("test.db")).unwrap());
        let registry = TransactionRegistry::new(db.clone(), Duration::days(90)).unwrap();
        (dir, db, registry)
    }

    #[test]
    fn test_try_begin_then_complete() {
        let (_dir, _db, registry) = create_registry();

        assert!(registry.try_begin("tx_1").unwrap());
        assert!(registry.is_in_flight("tx_1"));
        assert!(registry.is_processed_or_in_flight("tx_1").unwrap());
        assert!(!registry.is_processed("tx_1").unwrap());
        assert!(!registry.try_begin("tx_1").unwrap());

        registry.complete_processing("tx_1", true).unwrap();
        assert!(!registry.is_in_flight("tx_1"));
        assert!(registry.is_processed("tx_1").unwrap());
        assert!(!registry.try_begin("tx_1").unwrap());
    }

    #[test]
    fn test_failed_attempt_releases_key() {
        let (_dir, _db, registry) = create_registry();

        registry.mark_in_flight("tx_2");
        registry.complete_processing("tx_2", false).unwrap();

        assert!(!registry.is_processed_or_in_flight("tx_2").unwrap());
        assert!(registry.try_begin("tx_2").unwrap());
    }

    #[test]
    fn test_double_completion_keeps_single_entry() {
        let (_dir, db, registry) = create_registry();

        registry.complete_processing("tx_3", true).unwrap();
        registry.complete_processing("tx_3", true).unwrap();

        assert_eq!(registry.completed_count().unwrap(), 1);
        assert_eq!(db.get_completed_transactions().unwrap().len(), 1);
    }

    #[test]
    fn test_completed_set_survives_restart() {
        let (_dir, db, registry) = create_registry();
        registry.try_begin("tx_4").unwrap();
        registry.complete_processing("tx_4", true).unwrap();
        registry.mark_in_flight("tx_5");
        drop(registry);

        let reloaded = TransactionRegistry::new(db, Duration::days(90)).unwrap();
        assert!(reloaded.is_processed("tx_4").unwrap());
        assert!(!reloaded.is_processed_or_in_flight("tx_5").unwrap());
    }

    #[test]
    fn test_cleanup_expired_uses_retention() {
        let (_dir, db, registry) = create_registry();
        let now = Utc::now();

        db.save_completed_transaction("tx_old", &(now - Duration::days(91))).unwrap();
        db.save_completed_transaction("tx_recent", &(now - Duration::days(89))).unwrap();
        let registry = {
            drop(registry);
            TransactionRegistry::new(db.clone(), Duration::days(90)).unwrap()
        };

        assert_eq!(registry.cleanup_expired(now).unwrap(), 1);
        assert!(!registry.is_processed("tx_old").unwrap());
        assert!(registry.is_processed("tx_recent").unwrap());
        assert_eq!(db.get_completed_transactions().unwrap().len(), 1);
    }

    #[test]
    fn test_check_then_mark_blocks_second_caller() {
        let (_dir, _db, registry) = create_registry();

        // Caller A checks and claims the key
        assert!(!registry.is_processed_or_in_flight("tx_seq").unwrap());
        registry.mark_in_flight("tx_seq");

        // Caller B arrives after A's claim and must back off
        assert!(registry.is_processed_or_in_flight("tx_seq").unwrap());
        assert!(!registry.is_processed("tx_seq").unwrap());

        registry.complete_processing("tx_seq", true).unwrap();
        assert!(registry.is_processed_or_in_flight("tx_seq").unwrap());
        assert!(!registry.is_in_flight("tx_seq"));
    }

    #[test]
    fn test_persist_failure_leaves_key_unprocessed() {
        let (_dir, db, registry) = create_registry();
        db.with_connection(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_completed BEFORE INSERT ON completed_transactions
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )?;
            Ok(())
        }).unwrap();

        assert!(registry.try_begin("tx_io").unwrap());
        assert!(registry.complete_processing("tx_io", true).is_err());

        assert!(!registry.is_processed("tx_io").unwrap());
        assert!(!registry.is_in_flight("tx_io"));
        assert_eq!(registry.completed_count().unwrap(), 0);
        assert!(db.get_completed_transactions().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_try_begin_single_winner() {
        let (_dir, _db, registry) = create_registry();
        let registry = Arc::new(registry);

        let attempts = (0..16).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.try_begin("tx_race").unwrap() })
        });

        let winners = futures_util::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();

        assert_eq!(winners, 1);
        assert_eq!(registry.in_flight_count(), 1);
    }
}
