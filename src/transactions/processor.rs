// Transaction processor
//
// Shared path for the store listener and the restore flow: dedup, validate
// with the server, then record the result in the registry or retry queue.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::registry::TransactionRegistry;
use super::retry_queue::{RetryOutcome, RetryQueue};
use crate::database::TransactionValidation;
use crate::remote::RemoteApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Validated,
    /// Already completed or another caller holds it in flight
    Skipped,
    Failed(RetryOutcome),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPassReport {
    pub attempted: usize,
    pub validated: usize,
    pub skipped: usize,
    pub requeued: usize,
    pub abandoned: usize,
    /// Entries whose attempt hit a local storage error; they stay queued
    pub errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub expired_completed: usize,
    pub stale_failed: usize,
}

pub struct TransactionProcessor {
    registry: Arc<TransactionRegistry>,
    retry_queue: Arc<RetryQueue>,
    remote: Arc<dyn RemoteApi>,
}

impl TransactionProcessor {
    pub fn new(
        registry: Arc<TransactionRegistry>,
        retry_queue: Arc<RetryQueue>,
        remote: Arc<dyn RemoteApi>,
    ) -> Self {
        Self {
            registry,
            retry_queue,
            remote,
        }
    }

    /// Validate one transaction at most once across concurrent callers
    pub async fn process(&self, validation: &TransactionValidation) -> Result<ValidationOutcome> {
        let key = validation.transaction_id.as_str();

        if !self.registry.try_begin(key)? {
            if self.registry.is_processed(key)? && self.retry_queue.remove(key)? {
                log::debug!("Dropped retry entry for already validated transaction {}", key);
            }
            log::debug!("Skipping transaction {}: already processed or in flight", key);
            return Ok(ValidationOutcome::Skipped);
        }

        match self.remote.validate_transaction(validation).await {
            Ok(()) => {
                self.registry.complete_processing(key, true)?;
                self.retry_queue.remove(key)?;
                Ok(ValidationOutcome::Validated)
            }
            Err(e) => {
                self.registry.complete_processing(key, false)?;
                log::warn!(
                    "Validation failed for transaction {} (transient: {}): {}",
                    key,
                    e.is_transient(),
                    e
                );
                let outcome = self.retry_queue.add_or_bump(validation, Utc::now())?;
                Ok(ValidationOutcome::Failed(outcome))
            }
        }
    }

    /// Retry every queued transaction still under the retry limit
    pub async fn retry_failed(&self) -> Result<RetryPassReport> {
        let mut report = RetryPassReport::default();

        for failed in self.retry_queue.list_retryable()? {
            report.attempted += 1;
            match self.process(&failed.to_validation()).await {
                Ok(ValidationOutcome::Validated) => report.validated += 1,
                Ok(ValidationOutcome::Skipped) => report.skipped += 1,
                Ok(ValidationOutcome::Failed(RetryOutcome::Abandoned)) => report.abandoned += 1,
                Ok(ValidationOutcome::Failed(_)) => report.requeued += 1,
                Err(e) => {
                    log::error!("Retry of transaction {} failed: {}", failed.transaction_id, e);
                    report.errors += 1;
                }
            }
        }

        if report.attempted > 0 {
            log::info!(
                "Retry pass: {} attempted, {} validated, {} requeued, {} abandoned, {} errors",
                report.attempted, report.validated, report.requeued, report.abandoned, report.errors
            );
        }
        Ok(report)
    }

    /// Evict expired completed ids and stale failures
    pub fn run_cleanup(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        Ok(CleanupReport {
            expired_completed: self.registry.cleanup_expired(now)?,
            stale_failed: self.retry_queue.cleanup_stale(now)?,
        })
    }

    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    pub fn retry_queue(&self) -> &Arc<RetryQueue> {
        &self.retry_queue
    }
}
