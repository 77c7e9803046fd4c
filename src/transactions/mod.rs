// Transactions module
// Idempotent purchase validation: dedup registry, retry queue and the processor tying them together

pub mod processor;
pub mod registry;
pub mod retry_queue;

pub use processor::{CleanupReport, RetryPassReport, TransactionProcessor, ValidationOutcome};
pub use registry::TransactionRegistry;
pub use retry_queue::{RetryOutcome, RetryQueue};
