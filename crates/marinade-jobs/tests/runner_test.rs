//! Tests for the spawned orchestrator task and its handle.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use marinade_core::events::EventEnvelope;
use marinade_core::{Error, MarinationEvent, NoteStatus};
use marinade_db::MemoryStore;
use marinade_inference::mock::{Script, ScriptedGenerator};
use marinade_jobs::{spawn, Orchestrator, OrchestratorConfig, OrchestratorHandle, TickOutcome};

const LONG_TEXT: &str =
    "A note long enough to marinate, describing a half-formed plan for the garden.";

fn start_engine() -> (OrchestratorHandle, Arc<MemoryStore>, Arc<ScriptedGenerator>) {
    let store = Arc::new(MemoryStore::new());
    let generator = Arc::new(ScriptedGenerator::new());
    let config = OrchestratorConfig::default().with_generator_grace(Duration::ZERO);
    let orchestrator = Orchestrator::new(config, store.clone(), store.clone(), generator.clone());
    (spawn(orchestrator), store, generator)
}

/// Receive events until one matches, failing after a generous deadline.
async fn wait_for(
    rx: &mut broadcast::Receiver<EventEnvelope>,
    matches: impl Fn(&MarinationEvent) -> bool,
) -> MarinationEvent {
    let deadline = Duration::from_secs(300);
    tokio::time::timeout(deadline, async {
        loop {
            let envelope = rx.recv().await.expect("event bus closed");
            if matches(&envelope.payload) {
                return envelope.payload;
            }
        }
    })
    .await
    .expect("expected event never arrived")
}

#[tokio::test]
async fn test_activation_dispatches_immediately() {
    let (handle, store, generator) = start_engine();
    generator.push(Script::json(json!([
        {"type": "question", "reasoning": "Unclear budget.", "text": "How much can this cost?"}
    ])));
    let id = Uuid::now_v7();
    store.put_note(id, LONG_TEXT, None);
    let mut rx = handle.events();

    handle.activate_note(id).await.unwrap();

    let event = wait_for(&mut rx, |e| {
        matches!(e, MarinationEvent::SuggestionsUpdated { .. })
    })
    .await;
    match event {
        MarinationEvent::SuggestionsUpdated {
            note_id,
            suggestions,
        } => {
            assert_eq!(note_id, id);
            assert_eq!(suggestions.len(), 1);
        }
        other => panic!("Unexpected event {other:?}"),
    }
    assert_eq!(generator.start_count(), 1);

    let status = handle.status().await.unwrap();
    assert_eq!(status.in_flight, None);
    assert_eq!(status.notes.get(&id), Some(&NoteStatus::Active));
}

#[tokio::test]
async fn test_commands_are_acknowledged() {
    let (handle, store, _) = start_engine();
    let id = Uuid::now_v7();
    store.put_note(id, LONG_TEXT, Some(chrono::Utc::now()));

    assert!(handle.start().await.unwrap());
    assert!(!handle.start().await.unwrap());

    assert!(handle.pause().await.unwrap());
    assert!(handle.is_paused());
    assert_eq!(handle.tick().await.unwrap(), TickOutcome::Paused);
    assert!(handle.resume().await.unwrap());

    let err = handle.activate_note(Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(err, Error::NoteNotFound(_)));

    handle.note_did_edit(id).await.unwrap();
    handle.deactivate_note(id).await.unwrap();
    assert_eq!(
        handle.status().await.unwrap().notes.get(&id),
        Some(&NoteStatus::Idle)
    );

    assert!(handle.stop().await.unwrap());
    assert!(!handle.status().await.unwrap().running);
}

#[tokio::test]
async fn test_unavailable_backend_disables_through_handle() {
    let (handle, store, generator) = start_engine();
    generator.push(Script::Unavailable("connection refused".to_string()));
    let id = Uuid::now_v7();
    store.put_note(id, LONG_TEXT, None);
    let mut rx = handle.events();

    handle.activate_note(id).await.unwrap();

    let event = wait_for(&mut rx, |e| {
        matches!(e, MarinationEvent::EngineDisabled { .. })
    })
    .await;
    assert!(matches!(event, MarinationEvent::EngineDisabled { reason } if reason.contains("connection refused")));
    assert!(handle.is_disabled());
    assert_eq!(handle.tick().await.unwrap(), TickOutcome::Disabled);

    let status = handle.status().await.unwrap();
    assert!(status.disabled);
    assert!(status.disabled_reason.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_tick_activates_and_marinates() {
    let (handle, store, generator) = start_engine();
    let id = Uuid::now_v7();
    store.put_note(id, LONG_TEXT, None);
    let mut rx = handle.events();

    handle.start().await.unwrap();
    assert_eq!(generator.start_count(), 0);

    // First scheduled tick activates the note, the second marinates it.
    let event = wait_for(&mut rx, |e| {
        matches!(e, MarinationEvent::StatusChanged { status: NoteStatus::Active, .. })
    })
    .await;
    assert!(matches!(event, MarinationEvent::StatusChanged { note_id, .. } if note_id == id));

    wait_for(&mut rx, |e| {
        matches!(e, MarinationEvent::SuggestionsUpdated { .. })
    })
    .await;
    assert_eq!(generator.start_count(), 1);
    assert_eq!(store.state(id).unwrap().marination_count, 1);
}

#[tokio::test]
async fn test_stop_cancels_in_flight_request() {
    let (handle, store, generator) = start_engine();
    generator.push(Script::Hang);
    let id = Uuid::now_v7();
    store.put_note(id, LONG_TEXT, None);

    handle.start().await.unwrap();
    handle.activate_note(id).await.unwrap();
    assert_eq!(handle.status().await.unwrap().in_flight, Some(id));

    handle.stop().await.unwrap();
    assert_eq!(handle.status().await.unwrap().in_flight, None);
}

#[tokio::test]
async fn test_shutdown_ends_the_task() {
    let (handle, _, _) = start_engine();
    let other = handle.clone();

    handle.shutdown().await.unwrap();

    let err = other.status().await.unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
}
