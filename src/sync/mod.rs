// Sync module
// Server-wins reconciliation of the local meeting replica

pub mod engine;
pub mod reconcile;
pub mod scheduler;

pub use engine::{SyncEngine, SyncOutcome, SyncReport};
pub use reconcile::{apply_remote, meeting_from_remote, plan_sync, reconcile, PlannedChange, SyncAction};
pub use scheduler::spawn_background_tasks;
