// State management for meeting-sync

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::CoreConfig;
use crate::database::DatabaseManager;
use crate::processing::ProcessingTracker;
use crate::remote::RemoteApi;
use crate::sync::SyncEngine;
use crate::transactions::{RetryQueue, TransactionProcessor, TransactionRegistry};

/// Everything the host app holds on to, wired around one database
pub struct AppState {
    database: Arc<DatabaseManager>,
    config: CoreConfig,
    pub tracker: Arc<ProcessingTracker>,
    pub registry: Arc<TransactionRegistry>,
    pub retry_queue: Arc<RetryQueue>,
    pub processor: Arc<TransactionProcessor>,
    pub sync_engine: Arc<SyncEngine>,
}

impl AppState {
    /// Open the database, load configuration and build every component
    pub fn initialize(db_path: PathBuf, remote: Arc<dyn RemoteApi>) -> Result<Self> {
        let database = Arc::new(DatabaseManager::new(db_path)?);
        Self::from_database(database, remote, ProcessingTracker::new)
    }

    /// Like [`initialize`](Self::initialize) but with a progress listener on the tracker
    pub fn initialize_with_tracker<F>(
        db_path: PathBuf,
        remote: Arc<dyn RemoteApi>,
        make_tracker: F,
    ) -> Result<Self>
    where
        F: FnOnce(Arc<DatabaseManager>) -> ProcessingTracker,
    {
        let database = Arc::new(DatabaseManager::new(db_path)?);
        Self::from_database(database, remote, make_tracker)
    }

    fn from_database<F>(
        database: Arc<DatabaseManager>,
        remote: Arc<dyn RemoteApi>,
        make_tracker: F,
    ) -> Result<Self>
    where
        F: FnOnce(Arc<DatabaseManager>) -> ProcessingTracker,
    {
        let config = database
            .load_core_config()
            .context("Failed to load core configuration")?;

        let registry = Arc::new(TransactionRegistry::new(
            database.clone(),
            config.completed_retention,
        )?);
        let retry_queue = Arc::new(RetryQueue::new(
            database.clone(),
            config.max_retry_count,
            config.failed_max_age,
        )?);
        let processor = Arc::new(TransactionProcessor::new(
            registry.clone(),
            retry_queue.clone(),
            remote.clone(),
        ));
        let sync_engine = Arc::new(SyncEngine::new(database.clone(), remote)?);
        let tracker = Arc::new(make_tracker(database.clone()));

        log::info!(
            "Core initialized ({} failed transactions pending retry)",
            retry_queue.count()?
        );

        Ok(Self {
            database,
            config,
            tracker,
            registry,
            retry_queue,
            processor,
            sync_engine,
        })
    }

    pub fn db(&self) -> &DatabaseManager {
        &self.database
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TransactionValidation;
    use crate::processing::ProcessingState;
    use crate::remote::{RemoteError, RemoteMeeting};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct EmptyRemote;

    #[async_trait]
    impl RemoteApi for EmptyRemote {
        async fn fetch_all_meetings_with_content(&self) -> Result<Vec<RemoteMeeting>, RemoteError> {
            Ok(Vec::new())
        }

        async fn validate_transaction(&self, _validation: &TransactionValidation) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_initialize_wires_components() {
        let dir = tempdir().unwrap();
        let state = AppState::initialize(dir.path().join("app.db"), Arc::new(EmptyRemote)).unwrap();

        assert_eq!(state.config(), &CoreConfig::default());

        let meeting = state.tracker.create_meeting("Kickoff", None).unwrap();
        state.tracker.advance(&meeting.id, ProcessingState::Transcribing).unwrap();

        // Busy meeting survives a sync against an empty server
        state.sync_engine.sync_from_server().await;
        assert!(state.db().get_meeting(&meeting.id).unwrap().is_some());
        assert!(state.sync_engine.last_sync_date().is_some());
    }

    #[test]
    fn test_initialize_uses_stored_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.db");
        {
            let db = DatabaseManager::new(path.clone()).unwrap();
            let config = CoreConfig {
                max_retry_count: 5,
                ..CoreConfig::default()
            };
            db.save_core_config(&config).unwrap();
        }

        let state = AppState::initialize(path, Arc::new(EmptyRemote)).unwrap();
        assert_eq!(state.config().max_retry_count, 5);
    }

    #[test]
    fn test_initialize_survives_out_of_range_stored_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.db");
        {
            let db = DatabaseManager::new(path.clone()).unwrap();
            db.set_setting(crate::config::keys::MAX_RETRY_COUNT, "0", "integer").unwrap();
            db.set_setting(crate::config::keys::COMPLETED_RETENTION_DAYS, "-5", "integer").unwrap();
        }

        let state = AppState::initialize(path, Arc::new(EmptyRemote)).unwrap();
        assert_eq!(state.config(), &CoreConfig::default());
    }
}
