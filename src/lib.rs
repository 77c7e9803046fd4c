// meeting-sync - Local/remote reconciliation core for Meeting-Local
//
// This crate holds the parts of the client that are not UI:
// - Processing state of each meeting's transcription/summary job
// - Idempotent purchase validation (dedup registry + retry queue)
// - Server-wins sync of the local meeting replica
// - SQLite persistence for all of the above

// Performance logging macros - exported for use by other modules
#[macro_use]
pub mod macros;

// Core modules
pub mod config;
pub mod database;
pub mod processing;
pub mod remote;
pub mod state;
pub mod sync;
pub mod transactions;

pub use config::CoreConfig;
pub use database::{DatabaseManager, Meeting};
pub use processing::{LogicError, ProcessingProgress, ProcessingState, ProcessingStatus, ProcessingTracker};
pub use remote::{RemoteApi, RemoteError, RemoteMeeting};
pub use state::AppState;
pub use sync::{spawn_background_tasks, SyncEngine, SyncOutcome, SyncReport};
pub use transactions::{
    RetryOutcome, RetryQueue, TransactionProcessor, TransactionRegistry, ValidationOutcome,
};

/// Initialize env_logger to output to stderr (reads RUST_LOG env var).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();

    if result.is_ok() {
        log::info!("meeting-sync v{} logging initialized", env!("CARGO_PKG_VERSION"));
    }
}
