//! FileStore behaviour against a real temporary directory.

use std::sync::Arc;

use chrono::Utc;
use marinade_core::{
    NoteStatus, Outcome, Suggestion, SuggestionContent, SuggestionState,
};
use marinade_db::{FileStore, MarinationState, MarinationStore, NoteDirectory};
use tempfile::TempDir;
use uuid::Uuid;

fn sample_state(note_id: Uuid) -> MarinationState {
    let mut state = MarinationState::new(note_id);
    let question = Suggestion::new(
        SuggestionContent::Question {
            text: "Who is this for?".to_string(),
            choices: vec!["Team".to_string()],
        },
        "Audience unclear.",
    );
    let append = Suggestion::new(
        SuggestionContent::Append {
            text: "Next steps.".to_string(),
        },
        "Missing follow-up.",
    );
    let append_id = append.id;
    let now = Utc::now();
    state.merge_suggestions(vec![question, append], now);
    state.record_cycle(now);
    state
        .resolve_suggestion(append_id, Outcome::Accepted, now)
        .unwrap();
    state
}

#[tokio::test]
async fn test_state_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    let id = Uuid::now_v7();
    let state = sample_state(id);

    store.save_state(&state).await.unwrap();
    let loaded = store.load_state(id).await.unwrap().unwrap();

    assert_eq!(loaded, state);
    assert_eq!(loaded.history.len(), 1);
    assert_eq!(loaded.suggestions[1].state, SuggestionState::Accepted);

    // A fresh store over the same directory sees the same record.
    let reopened = FileStore::open(dir.path()).await.unwrap();
    assert_eq!(reopened.load_state(id).await.unwrap(), Some(state));
}

#[tokio::test]
async fn test_state_file_uses_camel_case_fields() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    let id = Uuid::now_v7();
    store.save_state(&sample_state(id)).await.unwrap();

    let raw = tokio::fs::read_to_string(store.state_path(id)).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["noteId"], id.to_string());
    assert_eq!(json["marinationCount"], 1);
    assert_eq!(json["phase"], "ingest");
    assert!(json["lastMarinatedAt"].is_string());
}

#[tokio::test]
async fn test_concurrent_saves_leave_a_valid_file() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let id = Uuid::now_v7();

    let mut tasks = Vec::new();
    for count in 0..16u32 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut state = MarinationState::new(id);
            state.marination_count = count;
            store.save_state(&state).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let loaded = store.load_state(id).await.unwrap().unwrap();
    assert!(loaded.marination_count < 16);
}

#[tokio::test]
async fn test_list_notes_reads_markdown_files_only() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    let first = Uuid::now_v7();
    let second = Uuid::now_v7();

    store.write_note(first, "short").await.unwrap();
    store.write_note(second, "ünïcödé text").await.unwrap();
    store.save_state(&MarinationState::new(first)).await.unwrap();
    tokio::fs::write(dir.path().join("README.md"), "not a note")
        .await
        .unwrap();
    tokio::fs::write(dir.path().join("scratch.txt"), "ignored")
        .await
        .unwrap();

    let notes = store.list_notes().await.unwrap();
    assert_eq!(notes.len(), 2);
    let len_of = |id: Uuid| notes.iter().find(|n| n.id == id).map(|n| n.text_len);
    assert_eq!(len_of(first), Some(5));
    assert_eq!(len_of(second), Some(12));
    assert!(notes.iter().all(|n| n.status == NoteStatus::Idle));
    assert!(notes.iter().all(|n| n.last_edited_at.is_some()));
}

#[tokio::test]
async fn test_remove_note_deletes_text_and_state() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    let id = Uuid::now_v7();
    store.write_note(id, "some text").await.unwrap();
    store.save_state(&MarinationState::new(id)).await.unwrap();

    store.remove_note(id).await.unwrap();

    assert!(store.load_note_text(id).await.unwrap().is_none());
    assert!(store.load_state(id).await.unwrap().is_none());
    assert!(store.list_notes().await.unwrap().is_empty());
}
