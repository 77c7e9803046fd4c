// sync/scheduler.rs
//
// Background loops: periodic server sync, and periodic transaction cleanup
// followed by a retry pass. Both stop when the token is cancelled.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::engine::SyncOutcome;
use crate::config::CoreConfig;
use crate::state::AppState;

pub fn spawn_background_tasks(
    state: Arc<AppState>,
    config: &CoreConfig,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_sync_loop(state.clone(), config.sync_interval, cancel.clone()),
        spawn_cleanup_loop(state, config.cleanup_interval, cancel),
    ]
}

fn spawn_sync_loop(
    state: Arc<AppState>,
    period: std::time::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("Starting sync loop (every {:?})", period);

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            if let SyncOutcome::Failed(e) = state.sync_engine.sync_from_server().await {
                log::warn!("Scheduled sync failed: {}", e);
            }
        }

        log::info!("Sync loop stopped");
    })
}

fn spawn_cleanup_loop(
    state: Arc<AppState>,
    period: std::time::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("Starting transaction cleanup loop (every {:?})", period);

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match state.processor.run_cleanup(Utc::now()) {
                Ok(report) => log::debug!(
                    "Cleanup: {} completed expired, {} failed purged",
                    report.expired_completed, report.stale_failed
                ),
                Err(e) => log::error!("Transaction cleanup failed: {}", e),
            }

            if let Err(e) = state.processor.retry_failed().await {
                log::error!("Retry pass failed: {}", e);
            }
        }

        log::info!("Transaction cleanup loop stopped");
    })
}
