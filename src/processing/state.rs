// processing/state.rs
//
// Processing lifecycle of a meeting's server-side job.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Stage of the remote transcription/summary job attached to a meeting
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    #[default]
    Pending,
    Transcribing,
    GeneratingSummary,
    Failed,
    Completed,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Pending => "pending",
            ProcessingState::Transcribing => "transcribing",
            ProcessingState::GeneratingSummary => "generating_summary",
            ProcessingState::Failed => "failed",
            ProcessingState::Completed => "completed",
        }
    }

    /// Parse a stored or remote state string. Unknown values fall back to `Pending`
    /// so a newer server state never blocks a sync pass.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => ProcessingState::Pending,
            "transcribing" => ProcessingState::Transcribing,
            "generating_summary" | "generatingsummary" => ProcessingState::GeneratingSummary,
            "failed" => ProcessingState::Failed,
            "completed" => ProcessingState::Completed,
            other => {
                log::warn!("Unknown processing state '{}', treating as pending", other);
                ProcessingState::Pending
            }
        }
    }

    /// A job is actively running on the server for this meeting
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            ProcessingState::Transcribing | ProcessingState::GeneratingSummary
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Failed | ProcessingState::Completed)
    }

    /// Position along the happy path, `None` for `Failed`
    fn rank(&self) -> Option<u8> {
        match self {
            ProcessingState::Pending => Some(0),
            ProcessingState::Transcribing => Some(1),
            ProcessingState::GeneratingSummary => Some(2),
            ProcessingState::Completed => Some(3),
            ProcessingState::Failed => None,
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Decoding goes through `from_str` so unknown states degrade to `Pending`
impl<'de> Deserialize<'de> for ProcessingState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(ProcessingState::from_str(&raw))
    }
}

/// Caller bugs detected by the processing state machine.
///
/// These are distinct from job failures, which are recorded on the meeting
/// through `record_error` and never returned as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicError {
    /// The requested state change is not an edge of the lifecycle
    InvalidTransition {
        from: ProcessingState,
        to: ProcessingState,
    },
    /// Chunk counters would report more completed chunks than exist
    ChunkProgressOutOfRange { completed: u32, total: u32 },
    /// Retry requested for a meeting that is not failed or has lost its audio
    NotRetryable {
        state: ProcessingState,
        audio_available: bool,
    },
}

impl fmt::Display for LogicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicError::InvalidTransition { from, to } => {
                write!(f, "Invalid processing transition: {} -> {}", from, to)
            }
            LogicError::ChunkProgressOutOfRange { completed, total } => write!(
                f,
                "Chunk progress out of range: {} completed of {} total",
                completed, total
            ),
            LogicError::NotRetryable {
                state,
                audio_available,
            } => write!(
                f,
                "Meeting cannot be retried (state: {}, audio available: {})",
                state, audio_available
            ),
        }
    }
}

impl std::error::Error for LogicError {}

/// Processing fields mirrored between the local replica and the server.
///
/// `is_processing` is derived from `state` and never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProcessingStatus {
    pub state: ProcessingState,
    pub error: Option<String>,
    pub last_processed_chunk: u32,
    pub total_chunks: u32,
}

impl ProcessingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processing(&self) -> bool {
        self.state.is_processing()
    }

    /// Move forward along the lifecycle.
    ///
    /// Returns `Ok(false)` when already in `to` (nothing changed). Failure goes
    /// through [`record_error`](Self::record_error) and `failed -> pending`
    /// through [`begin_retry`](Self::begin_retry).
    pub fn advance(&mut self, to: ProcessingState) -> Result<bool, LogicError> {
        if self.state == to {
            return Ok(false);
        }

        let allowed = match (self.state.rank(), to.rank()) {
            _ if self.state.is_terminal() => false,
            (Some(from), Some(target)) => target > from,
            _ => false,
        };

        if !allowed {
            return Err(LogicError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        self.state = to;
        Ok(true)
    }

    pub fn record_error(&mut self, message: impl Into<String>) -> Result<(), LogicError> {
        if self.state == ProcessingState::Completed {
            return Err(LogicError::InvalidTransition {
                from: self.state,
                to: ProcessingState::Failed,
            });
        }

        self.state = ProcessingState::Failed;
        self.error = Some(message.into());
        Ok(())
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn update_chunk_progress(&mut self, completed: u32, total: u32) -> Result<(), LogicError> {
        if completed > total {
            return Err(LogicError::ChunkProgressOutOfRange { completed, total });
        }

        self.last_processed_chunk = completed;
        self.total_chunks = total;
        Ok(())
    }

    /// Returns `Ok(false)` when the job was already completed
    pub fn mark_completed(&mut self) -> Result<bool, LogicError> {
        match self.state {
            ProcessingState::Completed => Ok(false),
            ProcessingState::Failed => Err(LogicError::InvalidTransition {
                from: self.state,
                to: ProcessingState::Completed,
            }),
            _ => {
                self.state = ProcessingState::Completed;
                self.error = None;
                Ok(true)
            }
        }
    }

    pub fn can_retry(&self, audio_available: bool) -> bool {
        self.state == ProcessingState::Failed && audio_available
    }

    /// The explicit `failed -> pending` edge
    pub fn begin_retry(&mut self, audio_available: bool) -> Result<(), LogicError> {
        if !self.can_retry(audio_available) {
            return Err(LogicError::NotRetryable {
                state: self.state,
                audio_available,
            });
        }

        self.state = ProcessingState::Pending;
        self.error = None;
        self.last_processed_chunk = 0;
        self.total_chunks = 0;
        Ok(())
    }

    pub fn progress_percentage(&self) -> u32 {
        if self.state == ProcessingState::Completed {
            return 100;
        }
        if self.total_chunks == 0 {
            return 0;
        }
        let percent = (self.last_processed_chunk as u64 * 100) / self.total_chunks as u64;
        percent.min(100) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [ProcessingState; 5] = [
        ProcessingState::Pending,
        ProcessingState::Transcribing,
        ProcessingState::GeneratingSummary,
        ProcessingState::Failed,
        ProcessingState::Completed,
    ];

    fn status_in(state: ProcessingState) -> ProcessingStatus {
        ProcessingStatus {
            state,
            ..ProcessingStatus::default()
        }
    }

    #[test]
    fn test_is_processing_follows_state() {
        for from in ALL_STATES {
            for target in ALL_STATES {
                let mut status = status_in(from);
                let _ = status.advance(target);
                assert_eq!(
                    status.is_processing(),
                    matches!(
                        status.state,
                        ProcessingState::Transcribing | ProcessingState::GeneratingSummary
                    ),
                    "inconsistent after advancing {:?} -> {:?}",
                    from,
                    target
                );

                let _ = status.record_error("boom");
                assert!(!status.is_processing());
                let _ = status.mark_completed();
                assert!(!status.is_processing());
            }
        }
    }

    #[test]
    fn test_happy_path() {
        let mut status = ProcessingStatus::new();
        assert!(status.advance(ProcessingState::Transcribing).unwrap());
        assert!(status.is_processing());
        assert!(status.advance(ProcessingState::GeneratingSummary).unwrap());
        assert!(status.is_processing());
        assert!(status.mark_completed().unwrap());
        assert_eq!(status.state, ProcessingState::Completed);
        assert!(!status.is_processing());
        assert_eq!(status.progress_percentage(), 100);
    }

    #[test]
    fn test_same_state_is_noop() {
        let mut status = status_in(ProcessingState::Transcribing);
        assert!(!status.advance(ProcessingState::Transcribing).unwrap());
        assert_eq!(status.state, ProcessingState::Transcribing);
    }

    #[test]
    fn test_backward_and_terminal_moves_rejected() {
        let mut status = status_in(ProcessingState::GeneratingSummary);
        assert_eq!(
            status.advance(ProcessingState::Transcribing),
            Err(LogicError::InvalidTransition {
                from: ProcessingState::GeneratingSummary,
                to: ProcessingState::Transcribing,
            })
        );

        let mut completed = status_in(ProcessingState::Completed);
        assert!(completed.advance(ProcessingState::Pending).is_err());
        assert!(completed.record_error("late").is_err());

        let mut failed = status_in(ProcessingState::Failed);
        assert!(failed.advance(ProcessingState::Pending).is_err());
        assert!(failed.mark_completed().is_err());
    }

    #[test]
    fn test_advance_to_failed_requires_record_error() {
        let mut status = status_in(ProcessingState::Transcribing);
        assert!(status.advance(ProcessingState::Failed).is_err());

        status.record_error("network dropped").unwrap();
        assert_eq!(status.state, ProcessingState::Failed);
        assert_eq!(status.error.as_deref(), Some("network dropped"));
    }

    #[test]
    fn test_clear_error_keeps_state() {
        let mut status = status_in(ProcessingState::Transcribing);
        status.record_error("timeout").unwrap();
        status.clear_error();
        assert_eq!(status.state, ProcessingState::Failed);
        assert!(status.error.is_none());
    }

    #[test]
    fn test_mark_completed_clears_error() {
        let mut status = status_in(ProcessingState::GeneratingSummary);
        status.error = Some("stale".to_string());
        status.mark_completed().unwrap();
        assert!(status.error.is_none());
        assert!(!status.mark_completed().unwrap());
    }

    #[test]
    fn test_chunk_progress_bounds() {
        let mut status = ProcessingStatus::new();
        for total in 0..20u32 {
            for completed in 0..=total {
                assert!(status.update_chunk_progress(completed, total).is_ok());
                assert_eq!(status.last_processed_chunk, completed);
                assert_eq!(status.total_chunks, total);
            }
            for completed in (total + 1)..(total + 5) {
                assert_eq!(
                    status.update_chunk_progress(completed, total),
                    Err(LogicError::ChunkProgressOutOfRange { completed, total })
                );
                // Rejected updates leave the previous counters in place
                assert_eq!(status.last_processed_chunk, total);
                assert_eq!(status.total_chunks, total);
            }
        }
    }

    #[test]
    fn test_chunk_progress_does_not_change_state() {
        let mut status = status_in(ProcessingState::Transcribing);
        status.update_chunk_progress(3, 3).unwrap();
        assert_eq!(status.state, ProcessingState::Transcribing);
    }

    #[test]
    fn test_progress_percentage() {
        let mut status = status_in(ProcessingState::Transcribing);
        assert_eq!(status.progress_percentage(), 0);
        status.update_chunk_progress(1, 4).unwrap();
        assert_eq!(status.progress_percentage(), 25);
        status.update_chunk_progress(4, 4).unwrap();
        assert_eq!(status.progress_percentage(), 100);
    }

    #[test]
    fn test_retry_requires_failed_and_audio() {
        let mut status = status_in(ProcessingState::Transcribing);
        status.update_chunk_progress(2, 5).unwrap();
        status.record_error("server 500").unwrap();

        assert!(!status.can_retry(false));
        assert!(status.begin_retry(false).is_err());
        assert!(status.can_retry(true));

        status.begin_retry(true).unwrap();
        assert_eq!(status.state, ProcessingState::Pending);
        assert!(status.error.is_none());
        assert_eq!(status.total_chunks, 0);

        assert!(status_in(ProcessingState::Completed).begin_retry(true).is_err());
    }

    #[test]
    fn test_state_string_round_trip() {
        for state in ALL_STATES {
            assert_eq!(ProcessingState::from_str(state.as_str()), state);
        }
        assert_eq!(ProcessingState::from_str("archived"), ProcessingState::Pending);
        assert_eq!(
            serde_json::to_string(&ProcessingState::GeneratingSummary).unwrap(),
            "\"generating_summary\""
        );
        assert_eq!(
            serde_json::from_str::<ProcessingState>("\"archived\"").unwrap(),
            ProcessingState::Pending
        );
        assert_eq!(
            serde_json::from_str::<ProcessingState>("\"transcribing\"").unwrap(),
            ProcessingState::Transcribing
        );
    }
}
