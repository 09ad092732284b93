//! In-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use marinade_core::{
    MarinationState, MarinationStore, NoteDirectory, NoteStatus, NoteSummary, Result,
};

#[derive(Debug, Clone)]
struct MemoryNote {
    text: String,
    status: NoteStatus,
    last_edited_at: Option<DateTime<Utc>>,
}

/// Notes and marination state held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    notes: RwLock<HashMap<Uuid, MemoryNote>>,
    states: RwLock<HashMap<Uuid, MarinationState>>,
    saves: AtomicUsize,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a note. Keeps the status of an existing note.
    pub fn put_note(&self, id: Uuid, text: impl Into<String>, last_edited_at: Option<DateTime<Utc>>) {
        let mut notes = write(&self.notes);
        let status = notes.get(&id).map(|n| n.status).unwrap_or_default();
        notes.insert(
            id,
            MemoryNote {
                text: text.into(),
                status,
                last_edited_at,
            },
        );
    }

    /// Host-side status reported by [`NoteDirectory::list_notes`].
    pub fn set_note_status(&self, id: Uuid, status: NoteStatus) {
        if let Some(note) = write(&self.notes).get_mut(&id) {
            note.status = status;
        }
    }

    /// Remove a note. Its marination state is left for the engine to clean up.
    pub fn remove_note(&self, id: Uuid) -> bool {
        write(&self.notes).remove(&id).is_some()
    }

    /// Snapshot of the stored state for `id`.
    pub fn state(&self, id: Uuid) -> Option<MarinationState> {
        read(&self.states).get(&id).cloned()
    }

    /// Seed state directly, bypassing the save counter.
    pub fn insert_state(&self, state: MarinationState) {
        write(&self.states).insert(state.note_id, state);
    }

    /// Number of successful `save_state` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarinationStore for MemoryStore {
    async fn load_state(&self, note_id: Uuid) -> Result<Option<MarinationState>> {
        Ok(self.state(note_id))
    }

    async fn save_state(&self, state: &MarinationState) -> Result<()> {
        write(&self.states).insert(state.note_id, state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_state(&self, note_id: Uuid) -> Result<()> {
        write(&self.states).remove(&note_id);
        Ok(())
    }

    async fn load_note_text(&self, note_id: Uuid) -> Result<Option<String>> {
        Ok(read(&self.notes).get(&note_id).map(|n| n.text.clone()))
    }
}

#[async_trait]
impl NoteDirectory for MemoryStore {
    async fn list_notes(&self) -> Result<Vec<NoteSummary>> {
        let mut summaries: Vec<NoteSummary> = read(&self.notes)
            .iter()
            .map(|(id, note)| NoteSummary {
                id: *id,
                status: note.status,
                text_len: note.text.chars().count(),
                last_edited_at: note.last_edited_at,
            })
            .collect();
        summaries.sort_by_key(|s| s.id);
        Ok(summaries)
    }
}
