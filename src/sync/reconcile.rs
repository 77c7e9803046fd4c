// sync/reconcile.rs
//
// Decides what a sync pass does with each meeting. The server wins, except
// for meetings whose job is still running locally: those are never touched.

use std::collections::{HashMap, HashSet};

use crate::database::Meeting;
use crate::processing::ProcessingStatus;
use crate::remote::RemoteMeeting;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    /// Remote only: materialize it locally
    Create,
    /// Both sides, local idle: overwrite from remote
    Update,
    /// Both sides, local busy: leave it alone
    Skip,
    /// Local only and idle: the server no longer has it
    Delete,
    /// Local only but busy: keep until its job settles
    Retain,
}

pub fn reconcile(local: Option<&Meeting>, remote: Option<&RemoteMeeting>) -> SyncAction {
    match (local, remote) {
        (None, Some(_)) => SyncAction::Create,
        (Some(local), Some(_)) if local.is_processing() => SyncAction::Skip,
        (Some(_), Some(_)) => SyncAction::Update,
        (Some(local), None) if local.is_processing() => SyncAction::Retain,
        (Some(_), None) => SyncAction::Delete,
        // Nothing on either side; only reachable if a caller passes two Nones
        (None, None) => SyncAction::Retain,
    }
}

/// One planned change, keyed by meeting id
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange<'a> {
    pub id: &'a str,
    pub action: SyncAction,
    pub local: Option<&'a Meeting>,
    pub remote: Option<&'a RemoteMeeting>,
}

/// Run [`reconcile`] over the union of local and remote ids.
///
/// Remote order is kept for remote ids, followed by local-only ids in local
/// order, so applying the plan is deterministic.
pub fn plan_sync<'a>(local: &'a [Meeting], remote: &'a [RemoteMeeting]) -> Vec<PlannedChange<'a>> {
    let local_by_id: HashMap<&str, &Meeting> = local.iter().map(|m| (m.id.as_str(), m)).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(remote.len());
    let mut plan = Vec::with_capacity(local.len().max(remote.len()));

    for r in remote {
        if !seen.insert(r.id.as_str()) {
            log::warn!("Server returned meeting {} more than once, using the first copy", r.id);
            continue;
        }
        let l = local_by_id.get(r.id.as_str()).copied();
        plan.push(PlannedChange {
            id: r.id.as_str(),
            action: reconcile(l, Some(r)),
            local: l,
            remote: Some(r),
        });
    }

    for l in local {
        if seen.contains(l.id.as_str()) {
            continue;
        }
        plan.push(PlannedChange {
            id: l.id.as_str(),
            action: reconcile(Some(l), None),
            local: Some(l),
            remote: None,
        });
    }

    plan
}

fn non_empty(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|s| !s.is_empty())
}

fn remote_processing(remote: &RemoteMeeting) -> ProcessingStatus {
    let mut completed = remote.last_processed_chunk;
    if completed > remote.total_chunks {
        log::warn!(
            "Meeting {} reports chunk {} of {}, clamping",
            remote.id, completed, remote.total_chunks
        );
        completed = remote.total_chunks;
    }

    ProcessingStatus {
        state: remote.processing_state,
        error: remote.processing_error.clone(),
        last_processed_chunk: completed,
        total_chunks: remote.total_chunks,
    }
}

/// Build a local meeting from a remote snapshot
pub fn meeting_from_remote(remote: &RemoteMeeting) -> Meeting {
    Meeting {
        id: remote.id.clone(),
        name: remote.name.clone(),
        location: remote.location.clone(),
        notes: remote.notes.clone(),
        duration_seconds: remote.duration_seconds,
        date_created: remote.date_created,
        date_modified: remote.date_modified,
        processing: remote_processing(remote),
        transcript: non_empty(&remote.transcript).cloned(),
        short_summary: non_empty(&remote.short_summary).cloned(),
        long_summary: non_empty(&remote.long_summary).cloned(),
        audio_file_path: None,
    }
}

/// Overwrite the mirrored fields of `local` with the server's values.
///
/// Content is only replaced by non-empty remote values, so a summary the
/// server has not produced yet never blanks a local one. The local audio
/// path is never touched.
pub fn apply_remote(local: &mut Meeting, remote: &RemoteMeeting) {
    local.name = remote.name.clone();
    local.location = remote.location.clone();
    local.notes = remote.notes.clone();
    local.duration_seconds = remote.duration_seconds;
    local.date_created = remote.date_created;
    local.date_modified = remote.date_modified;
    local.processing = remote_processing(remote);

    if let Some(text) = non_empty(&remote.transcript) {
        local.transcript = Some(text.clone());
    }
    if let Some(text) = non_empty(&remote.short_summary) {
        local.short_summary = Some(text.clone());
    }
    if let Some(text) = non_empty(&remote.long_summary) {
        local.long_summary = Some(text.clone());
    }
}
