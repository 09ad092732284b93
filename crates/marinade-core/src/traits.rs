//! Core traits for marinade abstractions.
//!
//! These traits define the external collaborators the engine consumes: the
//! store that persists per-note state and note text, the directory that
//! enumerates notes, and the streaming text generator. Concrete
//! implementations live in `marinade-db` and `marinade-inference`; tests
//! substitute fakes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{MarinationState, NoteSummary};

// =============================================================================
// STORE TRAITS
// =============================================================================

/// Persistence for per-note marination state and raw note text.
///
/// Writes for one note must be applied in order: a `load_state` that follows
/// a completed `save_state` for the same note observes that write.
#[async_trait]
pub trait MarinationStore: Send + Sync {
    /// Load a note's marination state, if one was ever created.
    async fn load_state(&self, note_id: Uuid) -> Result<Option<MarinationState>>;

    /// Persist a note's marination state.
    async fn save_state(&self, state: &MarinationState) -> Result<()>;

    /// Delete a note's marination state. Deleting a missing state is not an error.
    async fn delete_state(&self, note_id: Uuid) -> Result<()>;

    /// Load the note's current text. `None` means the note no longer exists.
    async fn load_note_text(&self, note_id: Uuid) -> Result<Option<String>>;
}

/// Enumeration of the notes the host currently offers for marination.
#[async_trait]
pub trait NoteDirectory: Send + Sync {
    /// List notes in a stable order. Called once per tick.
    async fn list_notes(&self) -> Result<Vec<NoteSummary>>;
}

// =============================================================================
// GENERATOR TRAITS
// =============================================================================

/// Event streamed from a generator session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorEvent {
    /// A chunk of generated text.
    TextDelta(String),
    /// The generator finished its turn.
    TurnComplete,
    /// The generator reported a failure for this turn.
    Error(String),
}

/// Opaque streaming text generator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Start a new session.
    ///
    /// Returns [`crate::Error::BackendUnavailable`] when the backend cannot be
    /// started or reached at all.
    async fn start(&self) -> Result<Box<dyn GeneratorSession>>;

    /// Name of the backend/model, for logs.
    fn name(&self) -> &str;
}

/// One conversation with a generator.
#[async_trait]
pub trait GeneratorSession: Send {
    /// Transmit the prompt; events start flowing afterwards.
    async fn send_prompt(&mut self, prompt: &str) -> Result<()>;

    /// Next event, or `None` once the session's stream is closed.
    async fn next_event(&mut self) -> Option<GeneratorEvent>;

    /// Abort the current turn.
    async fn cancel(&mut self);

    /// Release the session. Safe to call more than once.
    async fn terminate(&mut self);
}
