// Meetings repository for meeting-sync
// Handles CRUD operations for the local meeting replica

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, Row};

use super::models::Meeting;
use super::{format_timestamp, get_timestamp, DatabaseManager};
use crate::processing::{ProcessingState, ProcessingStatus};

const MEETING_COLUMNS: &str = r#"
    id, name, location, notes, duration_seconds, date_created, date_modified,
    processing_state, processing_error, last_processed_chunk, total_chunks,
    transcript, short_summary, long_summary, audio_file_path
"#;

impl DatabaseManager {
    /// Insert a new meeting
    pub fn create_meeting(&self, meeting: &Meeting) -> Result<String> {
        self.with_connection(|conn| {
            insert_meeting_impl(conn, meeting)?;
            Ok(meeting.id.clone())
        })
    }

    /// Get a meeting by ID
    pub fn get_meeting(&self, id: &str) -> Result<Option<Meeting>> {
        self.with_connection(|conn| {
            get_meeting_impl(conn, id)
        })
    }

    /// Get all meetings (most recent first)
    pub fn get_all_meetings(&self) -> Result<Vec<Meeting>> {
        self.with_connection(|conn| {
            get_all_meetings_impl(conn)
        })
    }

    /// Delete a meeting
    pub fn delete_meeting(&self, id: &str) -> Result<()> {
        self.with_connection(|conn| {
            delete_meeting_impl(conn, id)
        })
    }

    /// Read-modify-write a meeting while holding the connection.
    ///
    /// `f` runs inside a transaction; if it fails nothing is written.
    pub fn modify_meeting<F>(&self, id: &str, f: F) -> Result<Meeting>
    where
        F: FnOnce(&mut Meeting) -> Result<()>,
    {
        self.with_transaction(|tx| {
            let mut meeting = get_meeting_impl(tx, id)?
                .ok_or_else(|| anyhow!("Meeting not found: {}", id))?;
            f(&mut meeting)?;
            upsert_meeting_impl(tx, &meeting)?;
            Ok(meeting)
        })
    }
}

fn meeting_from_row(row: &Row<'_>) -> rusqlite::Result<Meeting> {
    let state: String = row.get(7)?;
    Ok(Meeting {
        id: row.get(0)?,
        name: row.get(1)?,
        location: row.get(2)?,
        notes: row.get(3)?,
        duration_seconds: row.get(4)?,
        date_created: get_timestamp(row, 5)?,
        date_modified: get_timestamp(row, 6)?,
        processing: ProcessingStatus {
            state: ProcessingState::from_str(&state),
            error: row.get(8)?,
            last_processed_chunk: row.get(9)?,
            total_chunks: row.get(10)?,
        },
        transcript: row.get(11)?,
        short_summary: row.get(12)?,
        long_summary: row.get(13)?,
        audio_file_path: row.get(14)?,
    })
}

pub(crate) fn insert_meeting_impl(conn: &Connection, meeting: &Meeting) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO meetings (
            id, name, location, notes, duration_seconds, date_created, date_modified,
            processing_state, processing_error, last_processed_chunk, total_chunks,
            transcript, short_summary, long_summary, audio_file_path
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            meeting.id,
            meeting.name,
            meeting.location,
            meeting.notes,
            meeting.duration_seconds,
            format_timestamp(&meeting.date_created),
            format_timestamp(&meeting.date_modified),
            meeting.processing.state.as_str(),
            meeting.processing.error,
            meeting.processing.last_processed_chunk,
            meeting.processing.total_chunks,
            meeting.transcript,
            meeting.short_summary,
            meeting.long_summary,
            meeting.audio_file_path,
        ],
    ).with_context(|| format!("Failed to create meeting {}", meeting.id))?;

    Ok(())
}

pub(crate) fn upsert_meeting_impl(conn: &Connection, meeting: &Meeting) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO meetings (
            id, name, location, notes, duration_seconds, date_created, date_modified,
            processing_state, processing_error, last_processed_chunk, total_chunks,
            transcript, short_summary, long_summary, audio_file_path
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            location = excluded.location,
            notes = excluded.notes,
            duration_seconds = excluded.duration_seconds,
            date_created = excluded.date_created,
            date_modified = excluded.date_modified,
            processing_state = excluded.processing_state,
            processing_error = excluded.processing_error,
            last_processed_chunk = excluded.last_processed_chunk,
            total_chunks = excluded.total_chunks,
            transcript = excluded.transcript,
            short_summary = excluded.short_summary,
            long_summary = excluded.long_summary,
            audio_file_path = excluded.audio_file_path
        "#,
        params![
            meeting.id,
            meeting.name,
            meeting.location,
            meeting.notes,
            meeting.duration_seconds,
            format_timestamp(&meeting.date_created),
            format_timestamp(&meeting.date_modified),
            meeting.processing.state.as_str(),
            meeting.processing.error,
            meeting.processing.last_processed_chunk,
            meeting.processing.total_chunks,
            meeting.transcript,
            meeting.short_summary,
            meeting.long_summary,
            meeting.audio_file_path,
        ],
    ).with_context(|| format!("Failed to save meeting {}", meeting.id))?;

    Ok(())
}

pub(crate) fn get_meeting_impl(conn: &Connection, id: &str) -> Result<Option<Meeting>> {
    let sql = format!("SELECT {} FROM meetings WHERE id = ?", MEETING_COLUMNS);
    let mut stmt = conn.prepare(&sql)
        .context("Failed to prepare get_meeting query")?;

    let result = stmt.query_row(params![id], meeting_from_row);

    match result {
        Ok(meeting) => Ok(Some(meeting)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get meeting"),
    }
}

pub(crate) fn get_all_meetings_impl(conn: &Connection) -> Result<Vec<Meeting>> {
    let sql = format!(
        "SELECT {} FROM meetings ORDER BY date_created DESC",
        MEETING_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)
        .context("Failed to prepare get_all_meetings query")?;

    let meetings = stmt.query_map([], meeting_from_row)
        .context("Failed to query meetings")?;

    meetings.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect meetings")
}

pub(crate) fn delete_meeting_impl(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM meetings WHERE id = ?",
        params![id],
    ).with_context(|| format!("Failed to delete meeting {}", id))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn create_test_db() -> (TempDir, DatabaseManager) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = DatabaseManager::new(db_path).unwrap();
        (dir, db)
    }

    #[test]
    fn test_create_and_get_meeting() {
        let (_dir, db) = create_test_db();

        let mut meeting = Meeting::with_id("meet_123", "Weekly Sync");
        meeting.location = Some("Room 4".to_string());
        meeting.duration_seconds = Some(1820.5);
        db.create_meeting(&meeting).unwrap();

        let retrieved = db.get_meeting("meet_123").unwrap().unwrap();
        assert_eq!(retrieved, meeting);
        assert!(db.get_meeting("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_create_fails() {
        let (_dir, db) = create_test_db();

        let meeting = Meeting::with_id("meet_1", "Kickoff");
        db.create_meeting(&meeting).unwrap();
        assert!(db.create_meeting(&meeting).is_err());
    }

    #[test]
    fn test_modify_meeting_persists_processing() {
        let (_dir, db) = create_test_db();
        db.create_meeting(&Meeting::with_id("meet_2", "Design Review")).unwrap();

        let updated = db.modify_meeting("meet_2", |m| {
            m.advance(ProcessingState::Transcribing)?;
            m.update_chunk_progress(2, 8)?;
            Ok(())
        }).unwrap();
        assert!(updated.is_processing());

        let stored = db.get_meeting("meet_2").unwrap().unwrap();
        assert_eq!(stored.state(), ProcessingState::Transcribing);
        assert_eq!(stored.processing.last_processed_chunk, 2);
        assert_eq!(stored.processing.total_chunks, 8);
    }

    #[test]
    fn test_modify_meeting_failure_writes_nothing() {
        let (_dir, db) = create_test_db();
        let original = Meeting::with_id("meet_3", "Retro");
        db.create_meeting(&original).unwrap();

        let result = db.modify_meeting("meet_3", |m| {
            m.advance(ProcessingState::Transcribing)?;
            m.update_chunk_progress(9, 3)?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(db.get_meeting("meet_3").unwrap().unwrap(), original);

        assert!(db.modify_meeting("nope", |_| Ok(())).is_err());
    }

    #[test]
    fn test_delete_meeting() {
        let (_dir, db) = create_test_db();
        db.create_meeting(&Meeting::with_id("meet_4", "1:1")).unwrap();
        db.delete_meeting("meet_4").unwrap();
        assert!(db.get_all_meetings().unwrap().is_empty());
    }
}
