// Database models - Meeting
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::processing::{LogicError, ProcessingState, ProcessingStatus};

/// A meeting in the local replica.
///
/// Descriptive fields, processing status and content are mirrored from the
/// server. `audio_file_path` is local only and never touched by sync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meeting {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub duration_seconds: Option<f64>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub processing: ProcessingStatus,
    pub transcript: Option<String>,
    pub short_summary: Option<String>,
    pub long_summary: Option<String>,
    pub audio_file_path: Option<String>,
}

impl Meeting {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            location: None,
            notes: None,
            duration_seconds: None,
            date_created: now,
            date_modified: now,
            processing: ProcessingStatus::new(),
            transcript: None,
            short_summary: None,
            long_summary: None,
            audio_file_path: None,
        }
    }

    pub fn state(&self) -> ProcessingState {
        self.processing.state
    }

    pub fn is_processing(&self) -> bool {
        self.processing.is_processing()
    }

    pub fn progress_percentage(&self) -> u32 {
        self.processing.progress_percentage()
    }

    /// Whether the cached audio this meeting was recorded into is still on disk
    pub fn has_local_audio(&self) -> bool {
        self.audio_file_path
            .as_deref()
            .map(|p| Path::new(p).exists())
            .unwrap_or(false)
    }

    pub fn can_retry(&self) -> bool {
        self.processing.can_retry(self.has_local_audio())
    }

    fn touch(&mut self) {
        self.date_modified = Utc::now();
    }

    pub fn advance(&mut self, to: ProcessingState) -> Result<(), LogicError> {
        if self.processing.advance(to)? {
            self.touch();
        }
        Ok(())
    }

    pub fn record_error(&mut self, message: impl Into<String>) -> Result<(), LogicError> {
        self.processing.record_error(message)?;
        self.touch();
        Ok(())
    }

    pub fn clear_error(&mut self) {
        if self.processing.error.is_some() {
            self.processing.clear_error();
            self.touch();
        }
    }

    pub fn update_chunk_progress(&mut self, completed: u32, total: u32) -> Result<(), LogicError> {
        self.processing.update_chunk_progress(completed, total)?;
        self.touch();
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<(), LogicError> {
        if self.processing.mark_completed()? {
            self.touch();
        }
        Ok(())
    }

    pub fn begin_retry(&mut self) -> Result<(), LogicError> {
        let audio_available = self.has_local_audio();
        self.processing.begin_retry(audio_available)?;
        self.touch();
        Ok(())
    }

    /// Store job output as it arrives. `None` leaves a field as it is.
    pub fn set_content(
        &mut self,
        transcript: Option<String>,
        short_summary: Option<String>,
        long_summary: Option<String>,
    ) {
        let mut changed = false;
        if let Some(text) = transcript {
            self.transcript = Some(text);
            changed = true;
        }
        if let Some(text) = short_summary {
            self.short_summary = Some(text);
            changed = true;
        }
        if let Some(text) = long_summary {
            self.long_summary = Some(text);
            changed = true;
        }
        if changed {
            self.touch();
        }
    }
}
