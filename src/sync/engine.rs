// sync/engine.rs
//
// Pulls every meeting from the server and reconciles the local replica
// against it in a single SQLite transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::reconcile::{apply_remote, meeting_from_remote, plan_sync, SyncAction};
use crate::database::meetings_repo::{
    delete_meeting_impl, get_all_meetings_impl, insert_meeting_impl, upsert_meeting_impl,
};
use crate::database::settings_repo::set_last_sync_date_impl;
use crate::database::DatabaseManager;
use crate::remote::{RemoteApi, RemoteMeeting};

/// Counts of what a sync pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub retained: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced(SyncReport),
    /// The pass aborted and the replica is unchanged. The message is also
    /// available from [`SyncEngine::last_sync_error`].
    Failed(String),
    /// Another pass was already running; this call did nothing
    AlreadyRunning,
}

/// Clears the syncing flag when a pass ends, however it ends
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncEngine {
    db: Arc<DatabaseManager>,
    remote: Arc<dyn RemoteApi>,
    syncing: AtomicBool,
    last_sync_date: Mutex<Option<DateTime<Utc>>>,
    last_sync_error: Mutex<Option<String>>,
}

impl SyncEngine {
    pub fn new(db: Arc<DatabaseManager>, remote: Arc<dyn RemoteApi>) -> Result<Self> {
        let last_sync_date = db
            .get_last_sync_date()
            .context("Failed to load last sync date")?;

        Ok(Self {
            db,
            remote,
            syncing: AtomicBool::new(false),
            last_sync_date: Mutex::new(last_sync_date),
            last_sync_error: Mutex::new(None),
        })
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn last_sync_date(&self) -> Option<DateTime<Utc>> {
        self.last_sync_date.lock().ok().and_then(|d| *d)
    }

    pub fn last_sync_error(&self) -> Option<String> {
        self.last_sync_error.lock().ok().and_then(|e| e.clone())
    }

    /// Run one reconciliation pass.
    ///
    /// Returns [`SyncOutcome::AlreadyRunning`] immediately if a pass is in
    /// progress. Fetch and persist failures are recorded in
    /// `last_sync_error` rather than returned.
    pub async fn sync_from_server(&self) -> SyncOutcome {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Sync already in progress, skipping");
            return SyncOutcome::AlreadyRunning;
        }
        let _guard = SyncGuard(&self.syncing);

        let start = Instant::now();
        log::info!("Starting sync from server");

        let result = match self.remote.fetch_all_meetings_with_content().await {
            Ok(remote) => {
                perf_debug!("Fetched {} remote meetings in {:?}", remote.len(), start.elapsed());
                self.apply(&remote)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to fetch meetings from server")),
        };

        match result {
            Ok((report, synced_at)) => {
                if let Ok(mut date) = self.last_sync_date.lock() {
                    *date = Some(synced_at);
                }
                if let Ok(mut error) = self.last_sync_error.lock() {
                    *error = None;
                }
                log::info!(
                    "Sync complete: {} created, {} updated, {} skipped, {} deleted, {} retained",
                    report.created, report.updated, report.skipped, report.deleted, report.retained
                );
                perf_debug!("Sync pass took {:?}", start.elapsed());
                SyncOutcome::Synced(report)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                log::error!("Sync failed: {}", message);
                if let Ok(mut error) = self.last_sync_error.lock() {
                    *error = Some(message.clone());
                }
                SyncOutcome::Failed(message)
            }
        }
    }

    /// Reconcile and persist in one transaction. Local state is read inside
    /// the transaction so a processing update cannot land between the busy
    /// check and the overwrite.
    fn apply(&self, remote: &[RemoteMeeting]) -> Result<(SyncReport, DateTime<Utc>)> {
        self.db.with_transaction(|tx| {
            let local = get_all_meetings_impl(tx)?;
            let mut report = SyncReport::default();

            for change in plan_sync(&local, remote) {
                match (change.action, change.local, change.remote) {
                    (SyncAction::Create, _, Some(r)) => {
                        insert_meeting_impl(tx, &meeting_from_remote(r))?;
                        report.created += 1;
                    }
                    (SyncAction::Update, Some(l), Some(r)) => {
                        let mut meeting = l.clone();
                        apply_remote(&mut meeting, r);
                        if meeting != *l {
                            upsert_meeting_impl(tx, &meeting)?;
                        }
                        report.updated += 1;
                    }
                    (SyncAction::Skip, _, _) => {
                        log::debug!("Meeting {} is processing, keeping local copy", change.id);
                        report.skipped += 1;
                    }
                    (SyncAction::Delete, _, _) => {
                        delete_meeting_impl(tx, change.id)?;
                        report.deleted += 1;
                    }
                    (SyncAction::Retain, _, _) => {
                        log::debug!("Meeting {} missing on server but still processing", change.id);
                        report.retained += 1;
                    }
                    (action, _, _) => {
                        log::warn!("Ignoring inconsistent sync plan entry {:?} for {}", action, change.id);
                    }
                }
            }

            let synced_at = Utc::now();
            set_last_sync_date_impl(tx, &synced_at)?;
            Ok((report, synced_at))
        })
    }
}
