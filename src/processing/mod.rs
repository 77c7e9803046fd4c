// Processing module
// Lifecycle of a meeting's transcription/summary job and persisted progress tracking

pub mod state;
pub mod tracker;

pub use state::{LogicError, ProcessingState, ProcessingStatus};
pub use tracker::{ProcessingProgress, ProcessingTracker, ProgressListener};
