//! Directory-backed store.
//!
//! Layout under the root directory:
//!
//! ```text
//! {root}/{note_id}.md                  note text, owned by the host/editor
//! {root}/{note_id}.marination.json     marination state, owned by the engine
//! ```
//!
//! State writes go to a temp file that is synced and renamed over the target,
//! so a crash never leaves a half-written state file. Writes for the same
//! note are serialized through a per-note lock.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use marinade_core::{
    Error, MarinationState, MarinationStore, NoteDirectory, NoteStatus, NoteSummary, Result,
};

const NOTE_EXTENSION: &str = "md";
const STATE_SUFFIX: &str = ".marination.json";

/// Notes and state stored as files in one directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            warn!(root = %root.display(), error = %e, "file_store: create_dir_all failed");
            e
        })?;
        Ok(Self {
            root,
            write_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn note_path(&self, note_id: Uuid) -> PathBuf {
        self.root.join(format!("{note_id}.{NOTE_EXTENSION}"))
    }

    pub fn state_path(&self, note_id: Uuid) -> PathBuf {
        self.root.join(format!("{note_id}{STATE_SUFFIX}"))
    }

    /// Write note text. Used by hosts that create notes through the store.
    pub async fn write_note(&self, note_id: Uuid, text: &str) -> Result<()> {
        let _guard = self.lock_note(note_id).await;
        write_atomic(&self.note_path(note_id), text.as_bytes()).await
    }

    /// Remove a note's text and state.
    pub async fn remove_note(&self, note_id: Uuid) -> Result<()> {
        let _guard = self.lock_note(note_id).await;
        remove_if_exists(&self.note_path(note_id)).await?;
        remove_if_exists(&self.state_path(note_id)).await
    }

    async fn lock_note(&self, note_id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.write_locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(locks.entry(note_id).or_default())
        };
        lock.lock_owned().await
    }
}

#[async_trait]
impl MarinationStore for FileStore {
    async fn load_state(&self, note_id: Uuid) -> Result<Option<MarinationState>> {
        let path = self.state_path(note_id);
        let Some(bytes) = read_if_exists(&path).await? else {
            return Ok(None);
        };
        let state: MarinationState = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(path = %path.display(), error = %e, "file_store: corrupt state file");
            Error::Serialization(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(state))
    }

    async fn save_state(&self, state: &MarinationState) -> Result<()> {
        let data = serde_json::to_vec_pretty(state)?;
        let _guard = self.lock_note(state.note_id).await;
        let path = self.state_path(state.note_id);
        write_atomic(&path, &data).await?;
        debug!(note_id = %state.note_id, size = data.len(), "file_store: state saved");
        Ok(())
    }

    async fn delete_state(&self, note_id: Uuid) -> Result<()> {
        let _guard = self.lock_note(note_id).await;
        remove_if_exists(&self.state_path(note_id)).await
    }

    async fn load_note_text(&self, note_id: Uuid) -> Result<Option<String>> {
        let Some(bytes) = read_if_exists(&self.note_path(note_id)).await? else {
            return Ok(None);
        };
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[async_trait]
impl NoteDirectory for FileStore {
    async fn list_notes(&self) -> Result<Vec<NoteSummary>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut summaries = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(NOTE_EXTENSION) {
                continue;
            }
            let Some(note_id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };

            // A note deleted between listing and reading is simply skipped.
            let Some(bytes) = read_if_exists(&path).await? else {
                continue;
            };
            let last_edited_at = match entry.metadata().await {
                Ok(meta) => meta.modified().ok().map(DateTime::<Utc>::from),
                Err(_) => None,
            };

            summaries.push(NoteSummary {
                id: note_id,
                status: NoteStatus::Idle,
                text_len: String::from_utf8_lossy(&bytes).chars().count(),
                last_edited_at,
            });
        }

        summaries.sort_by_key(|s| s.id);
        Ok(summaries)
    }
}

async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write `data` to `path` via temp file + rename.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = fs::File::create(&temp_path).await.map_err(|e| {
        warn!(temp_path = %temp_path.display(), error = %e, "file_store: File::create failed");
        e
    })?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, path).await.map_err(|e| {
        warn!(from = %temp_path.display(), to = %path.display(), error = %e, "file_store: rename failed");
        e
    })?;
    Ok(())
}
