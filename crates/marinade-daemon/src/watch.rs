//! Edit and deletion detection for the notes directory.
//!
//! The directory is scanned on an interval and each note's modification
//! time compared with the previous scan. Notes present on the first scan
//! are recorded without being reported.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use marinade_core::{NoteDirectory, NoteSummary};
use marinade_jobs::OrchestratorHandle;

/// Change observed between two scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteChange {
    /// New note, or an existing note with a different modification time.
    Edited(Uuid),
    Deleted(Uuid),
}

/// Modification times seen on the last scan.
#[derive(Debug, Default)]
pub struct NoteWatcher {
    seen: HashMap<Uuid, Option<DateTime<Utc>>>,
    primed: bool,
}

impl NoteWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a fresh listing with the previous one.
    pub fn diff(&mut self, notes: &[NoteSummary]) -> Vec<NoteChange> {
        let mut changes = Vec::new();
        let mut current = HashMap::with_capacity(notes.len());

        for note in notes {
            current.insert(note.id, note.last_edited_at);
            match self.seen.get(&note.id) {
                Some(previous) if *previous == note.last_edited_at => {}
                Some(_) => changes.push(NoteChange::Edited(note.id)),
                None if self.primed => changes.push(NoteChange::Edited(note.id)),
                None => {}
            }
        }

        for id in self.seen.keys() {
            if !current.contains_key(id) {
                changes.push(NoteChange::Deleted(*id));
            }
        }

        self.seen = current;
        self.primed = true;
        changes
    }
}

/// Scan `directory` every `poll_interval` and report changes to the
/// orchestrator. Returns once the orchestrator has shut down.
pub async fn watch_notes(
    directory: Arc<dyn NoteDirectory>,
    handle: OrchestratorHandle,
    poll_interval: Duration,
) {
    let mut watcher = NoteWatcher::new();
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        poll_interval_secs = poll_interval.as_secs(),
        "Watching notes directory"
    );

    loop {
        interval.tick().await;

        let notes = match directory.list_notes().await {
            Ok(notes) => notes,
            Err(e) => {
                warn!(error = %e, "Failed to scan notes directory");
                continue;
            }
        };

        for change in watcher.diff(&notes) {
            let result = match change {
                NoteChange::Edited(id) => {
                    debug!(note_id = %id, "Note edited");
                    handle.note_did_edit(id).await
                }
                NoteChange::Deleted(id) => {
                    debug!(note_id = %id, "Note deleted");
                    handle.note_deleted(id).await
                }
            };
            if let Err(e) = result {
                info!(error = %e, "Orchestrator gone, watcher exiting");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marinade_core::NoteStatus;

    fn summary(id: Uuid, edited: Option<DateTime<Utc>>) -> NoteSummary {
        NoteSummary {
            id,
            status: NoteStatus::Idle,
            text_len: 120,
            last_edited_at: edited,
        }
    }

    #[test]
    fn test_first_scan_reports_nothing() {
        let mut watcher = NoteWatcher::new();
        let notes = vec![summary(Uuid::now_v7(), Some(Utc::now()))];
        assert!(watcher.diff(&notes).is_empty());
        assert!(watcher.diff(&notes).is_empty());
    }

    #[test]
    fn test_mtime_change_and_new_note_reported_as_edits() {
        let mut watcher = NoteWatcher::new();
        let id = Uuid::now_v7();
        let then = Utc::now() - chrono::Duration::minutes(5);
        watcher.diff(&[summary(id, Some(then))]);

        let added = Uuid::now_v7();
        let changes = watcher.diff(&[summary(id, Some(Utc::now())), summary(added, None)]);

        assert_eq!(changes.len(), 2);
        assert!(changes.contains(&NoteChange::Edited(id)));
        assert!(changes.contains(&NoteChange::Edited(added)));
    }

    #[test]
    fn test_missing_note_reported_once() {
        let mut watcher = NoteWatcher::new();
        let id = Uuid::now_v7();
        watcher.diff(&[summary(id, None)]);

        assert_eq!(watcher.diff(&[]), vec![NoteChange::Deleted(id)]);
        assert!(watcher.diff(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_detects_file_removal() {
        let dir = tempfile::tempdir().unwrap();
        let store = marinade_db::FileStore::open(dir.path()).await.unwrap();
        let id = Uuid::now_v7();
        store
            .write_note(id, "Some note text that exists on disk for a moment.")
            .await
            .unwrap();

        let mut watcher = NoteWatcher::new();
        watcher.diff(&store.list_notes().await.unwrap());

        store.remove_note(id).await.unwrap();
        let changes = watcher.diff(&store.list_notes().await.unwrap());
        assert_eq!(changes, vec![NoteChange::Deleted(id)]);
    }
}
