//! Marination event types and the event bus that delivers them to the host.
//!
//! The orchestrator emits every status change, phase change, suggestion
//! batch, and failure on one broadcast channel. Hosts (UI layers, the
//! daemon's logger, tests) subscribe independently; a slow subscriber only
//! lags itself.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{NotePhase, NoteStatus, Suggestion};

/// Coarse classification of a failed generation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Stream error or malformed structured output; retried on a later tick.
    Transient,
    /// The request deadline fired.
    Timeout,
    /// The backend cannot be reached; the engine is now disabled.
    BackendUnavailable,
}

/// Domain event emitted by the orchestrator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarinationEvent {
    /// A note's scheduling status changed.
    StatusChanged { note_id: Uuid, status: NoteStatus },
    /// A note moved to a new phase.
    PhaseChanged { note_id: Uuid, phase: NotePhase },
    /// The note's current suggestion list, after a generation cycle or an
    /// accept/reject.
    SuggestionsUpdated {
        note_id: Uuid,
        suggestions: Vec<Suggestion>,
    },
    /// A generation cycle for the note failed.
    GenerationFailed {
        note_id: Uuid,
        kind: FailureKind,
        error: String,
    },
    /// The engine stopped dispatching for good.
    EngineDisabled { reason: String },
}

impl MarinationEvent {
    /// Dot-namespaced event name, used in logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            MarinationEvent::StatusChanged { .. } => "note.status_changed",
            MarinationEvent::PhaseChanged { .. } => "note.phase_changed",
            MarinationEvent::SuggestionsUpdated { .. } => "note.suggestions_updated",
            MarinationEvent::GenerationFailed { .. } => "generation.failed",
            MarinationEvent::EngineDisabled { .. } => "engine.disabled",
        }
    }

    /// Note the event concerns, if any.
    pub fn note_id(&self) -> Option<Uuid> {
        match self {
            MarinationEvent::StatusChanged { note_id, .. }
            | MarinationEvent::PhaseChanged { note_id, .. }
            | MarinationEvent::SuggestionsUpdated { note_id, .. }
            | MarinationEvent::GenerationFailed { note_id, .. } => Some(*note_id),
            MarinationEvent::EngineDisabled { .. } => None,
        }
    }
}

/// Event plus delivery metadata.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type (e.g., `"note.status_changed"`).
    pub event_type: &'static str,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    pub payload: MarinationEvent,
}

impl EventEnvelope {
    pub fn new(payload: MarinationEvent) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: payload.event_type(),
            occurred_at: Utc::now(),
            payload,
        }
    }
}

/// Broadcast bus for marination events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers.
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub fn emit(&self, event: MarinationEvent) {
        let envelope = EventEnvelope::new(event);
        tracing::debug!(
            event_type = envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to receive events. Each subscriber gets its own independent stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}
