// Processing tracker
//
// Applies job-progress updates to persisted meetings and notifies a listener
// after each committed change.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ProcessingState;
use crate::database::{DatabaseManager, Meeting};

/// Progress snapshot emitted after every committed processing update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub meeting_id: String,
    pub state: ProcessingState,
    pub is_processing: bool,
    pub progress_percent: u32,
    pub current_chunk: u32,
    pub total_chunks: u32,
    pub error: Option<String>,
}

impl ProcessingProgress {
    pub fn from_meeting(meeting: &Meeting) -> Self {
        Self {
            meeting_id: meeting.id.clone(),
            state: meeting.state(),
            is_processing: meeting.is_processing(),
            progress_percent: meeting.progress_percentage(),
            current_chunk: meeting.processing.last_processed_chunk,
            total_chunks: meeting.processing.total_chunks,
            error: meeting.processing.error.clone(),
        }
    }
}

pub type ProgressListener = Box<dyn Fn(&ProcessingProgress) + Send + Sync>;

/// Persists processing transitions for meetings.
///
/// Each update is a read-modify-write on a single meeting under the database
/// lock, so it serializes with sync passes. A transition rejected by the state
/// machine is returned as a [`LogicError`](super::LogicError) inside the
/// `anyhow::Error` and nothing is written.
pub struct ProcessingTracker {
    db: Arc<DatabaseManager>,
    listener: Option<ProgressListener>,
}

impl ProcessingTracker {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db, listener: None }
    }

    pub fn with_listener(db: Arc<DatabaseManager>, listener: ProgressListener) -> Self {
        Self {
            db,
            listener: Some(listener),
        }
    }

    /// Register a meeting created locally, before its job starts
    pub fn create_meeting(
        &self,
        name: impl Into<String>,
        audio_file_path: Option<String>,
    ) -> Result<Meeting> {
        let mut meeting = Meeting::new(name);
        meeting.audio_file_path = audio_file_path;
        self.db.create_meeting(&meeting)?;
        log::info!("Created meeting {} ({})", meeting.id, meeting.name);
        Ok(meeting)
    }

    pub fn advance(&self, meeting_id: &str, to: ProcessingState) -> Result<Meeting> {
        let meeting = self.db.modify_meeting(meeting_id, |m| {
            m.advance(to)?;
            Ok(())
        })?;
        log::debug!("Meeting {} now {}", meeting_id, meeting.state());
        self.notify(&meeting);
        Ok(meeting)
    }

    pub fn update_chunk_progress(&self, meeting_id: &str, completed: u32, total: u32) -> Result<Meeting> {
        let meeting = self.db.modify_meeting(meeting_id, |m| {
            m.update_chunk_progress(completed, total)?;
            Ok(())
        })?;
        perf_trace!("Meeting {} chunk {}/{}", meeting_id, completed, total);
        self.notify(&meeting);
        Ok(meeting)
    }

    /// Move the meeting to `failed` with the job's error message
    pub fn record_error(&self, meeting_id: &str, message: &str) -> Result<Meeting> {
        let meeting = self.db.modify_meeting(meeting_id, |m| {
            m.record_error(message)?;
            Ok(())
        })?;
        log::warn!("Processing failed for meeting {}: {}", meeting_id, message);
        self.notify(&meeting);
        Ok(meeting)
    }

    pub fn clear_error(&self, meeting_id: &str) -> Result<Meeting> {
        let meeting = self.db.modify_meeting(meeting_id, |m| {
            m.clear_error();
            Ok(())
        })?;
        self.notify(&meeting);
        Ok(meeting)
    }

    pub fn mark_completed(&self, meeting_id: &str) -> Result<Meeting> {
        let meeting = self.db.modify_meeting(meeting_id, |m| {
            m.mark_completed()?;
            Ok(())
        })?;
        log::info!("Processing completed for meeting {}", meeting_id);
        self.notify(&meeting);
        Ok(meeting)
    }

    /// Reset a failed meeting to `pending` so its cached audio can be resubmitted
    pub fn begin_retry(&self, meeting_id: &str) -> Result<Meeting> {
        let meeting = self.db.modify_meeting(meeting_id, |m| {
            m.begin_retry()?;
            Ok(())
        })?;
        log::info!("Retrying processing for meeting {}", meeting_id);
        self.notify(&meeting);
        Ok(meeting)
    }

    /// Store job output. `None` leaves the existing value alone.
    pub fn store_content(
        &self,
        meeting_id: &str,
        transcript: Option<String>,
        short_summary: Option<String>,
        long_summary: Option<String>,
    ) -> Result<Meeting> {
        self.db.modify_meeting(meeting_id, |m| {
            m.set_content(transcript, short_summary, long_summary);
            Ok(())
        })
    }

    fn notify(&self, meeting: &Meeting) {
        if let Some(listener) = &self.listener {
            listener(&ProcessingProgress::from_meeting(meeting));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::LogicError;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    fn create_tracker() -> (TempDir, Arc<DatabaseManager>) {
        let dir = tempdir().unwrap();
        let db = Arc::new(DatabaseManager::new(dir.path().join("test.db")).unwrap());
        (dir, db)
    }

    #[test]
    fn test_full_lifecycle_emits_progress() {
        let (_dir, db) = create_tracker();
        let events: Arc<Mutex<Vec<ProcessingProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let tracker = ProcessingTracker::with_listener(
            db.clone(),
            Box::new(move |p| sink.lock().unwrap().push(p.clone())),
        );

        let meeting = tracker.create_meeting("Planning", None).unwrap();
        tracker.advance(&meeting.id, ProcessingState::Transcribing).unwrap();
        tracker.update_chunk_progress(&meeting.id, 1, 4).unwrap();
        tracker.advance(&meeting.id, ProcessingState::GeneratingSummary).unwrap();
        tracker.store_content(&meeting.id, Some("hello".into()), None, None).unwrap();
        let done = tracker.mark_completed(&meeting.id).unwrap();

        assert_eq!(done.progress_percentage(), 100);
        assert_eq!(done.transcript.as_deref(), Some("hello"));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[1].progress_percent, 25);
        assert!(events[1].is_processing);
        assert_eq!(events[3].state, ProcessingState::Completed);
        assert!(!events[3].is_processing);
    }

    #[test]
    fn test_invalid_transition_is_logic_error_and_not_written() {
        let (_dir, db) = create_tracker();
        let tracker = ProcessingTracker::new(db.clone());

        let meeting = tracker.create_meeting("Standup", None).unwrap();
        tracker.mark_completed(&meeting.id).unwrap();

        let err = tracker.advance(&meeting.id, ProcessingState::Transcribing).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LogicError>(),
            Some(LogicError::InvalidTransition { .. })
        ));
        assert_eq!(db.get_meeting(&meeting.id).unwrap().unwrap().state(), ProcessingState::Completed);
    }

    #[test]
    fn test_retry_requires_local_audio() {
        let (dir, db) = create_tracker();
        let tracker = ProcessingTracker::new(db.clone());

        let no_audio = tracker.create_meeting("Lost audio", None).unwrap();
        tracker.record_error(&no_audio.id, "upload failed").unwrap();
        let err = tracker.begin_retry(&no_audio.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LogicError>(),
            Some(LogicError::NotRetryable { audio_available: false, .. })
        ));

        let audio_path = dir.path().join("meeting.m4a");
        std::fs::write(&audio_path, b"audio").unwrap();
        let meeting = tracker
            .create_meeting("Has audio", Some(audio_path.to_string_lossy().into_owned()))
            .unwrap();
        tracker.advance(&meeting.id, ProcessingState::Transcribing).unwrap();
        tracker.update_chunk_progress(&meeting.id, 3, 5).unwrap();
        let failed = tracker.record_error(&meeting.id, "server timeout").unwrap();
        assert_eq!(failed.processing.error.as_deref(), Some("server timeout"));

        let retried = tracker.begin_retry(&meeting.id).unwrap();
        assert_eq!(retried.state(), ProcessingState::Pending);
        assert!(retried.processing.error.is_none());
        assert_eq!(retried.processing.total_chunks, 0);
    }

    #[test]
    fn test_unknown_meeting_fails() {
        let (_dir, db) = create_tracker();
        let tracker = ProcessingTracker::new(db);
        assert!(tracker.advance("missing", ProcessingState::Transcribing).is_err());
    }
}
