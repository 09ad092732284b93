//! The marination orchestrator.
//!
//! Owns per-note scheduling status, the engine flags, and the single
//! in-flight generation request. Every mutation happens through `&mut self`,
//! so one owner (normally the task spawned by [`crate::runner::spawn`])
//! serializes all state changes. Generation results come back through a
//! small completion mailbox and are applied by [`Orchestrator::handle_completion`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::field::{display, Empty};
use tracing::{debug, error, info, instrument, warn, Span};
use uuid::Uuid;

use marinade_core::events::FailureKind;
use marinade_core::logging;
use marinade_core::{
    Error, EventBus, MarinationEvent, MarinationState, MarinationStore, NoteDirectory,
    NoteStatus, NoteSummary, Outcome, Resolution, Result, Suggestion, TextGenerator,
};
use marinade_inference::{
    build_prompt, parse_suggestions, GenerationRequest, RequestHandle, RequestOutcome,
};

use crate::config::OrchestratorConfig;
use crate::pause::PauseState;

/// Room for the live result plus one stale result from a request canceled
/// after it had already resolved. Each cancel drains the mailbox, so no more
/// than one stale result is ever queued.
const COMPLETION_MAILBOX_CAPACITY: usize = 2;

/// Result of a generation request, addressed to the request that produced it.
#[derive(Debug)]
pub struct Completion {
    request_id: u64,
    note_id: Uuid,
    outcome: RequestOutcome,
}

impl Completion {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn note_id(&self) -> Uuid {
        self.note_id
    }
}

/// What a call to [`Orchestrator::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Paused,
    Disabled,
    /// A request is already in flight.
    Busy,
    /// No active note is eligible for selection.
    NoActiveNotes,
    /// The selected note no longer exists.
    NoteMissing(Uuid),
    /// The selected note is shorter than the minimum length.
    ContentTooShort(Uuid),
    /// A generation request was dispatched for the note.
    Dispatched(Uuid),
}

/// Snapshot of the engine for hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub paused: bool,
    pub disabled: bool,
    pub disabled_reason: Option<String>,
    /// Note the in-flight request is for.
    pub in_flight: Option<Uuid>,
    pub notes: BTreeMap<Uuid, NoteStatus>,
}

struct InFlight {
    request_id: u64,
    note_id: Uuid,
    handle: RequestHandle,
    started: Instant,
}

/// Background suggestion engine.
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn MarinationStore>,
    directory: Arc<dyn NoteDirectory>,
    generator: Arc<dyn TextGenerator>,
    events: EventBus,
    flags: PauseState,
    running: bool,
    statuses: HashMap<Uuid, NoteStatus>,
    last_edits: HashMap<Uuid, DateTime<Utc>>,
    in_flight: Option<InFlight>,
    next_request_id: u64,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn MarinationStore>,
        directory: Arc<dyn NoteDirectory>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_MAILBOX_CAPACITY);
        Self {
            config,
            store,
            directory,
            generator,
            events: EventBus::default(),
            flags: PauseState::new(),
            running: false,
            statuses: HashMap::new(),
            last_edits: HashMap::new(),
            in_flight: None,
            next_request_id: 1,
            completion_tx,
            completion_rx,
        }
    }

    /// Emit on `events` instead of a private bus.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn pause_state(&self) -> &PauseState {
        &self.flags
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Status the orchestrator has recorded for a note, if any.
    pub fn note_status(&self, note_id: Uuid) -> Option<NoteStatus> {
        self.statuses.get(&note_id).copied()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.running,
            paused: self.flags.is_paused(),
            disabled: self.flags.is_disabled(),
            disabled_reason: self.flags.disabled_reason(),
            in_flight: self.in_flight.as_ref().map(|f| f.note_id),
            notes: self.statuses.iter().map(|(id, s)| (*id, *s)).collect(),
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Mark the engine running. Returns `false` if it already was.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        info!(
            subsystem = "scheduler",
            tick_interval_secs = self.config.tick_interval.as_secs(),
            "Orchestrator started"
        );
        true
    }

    /// Stop the engine and cancel any in-flight request. Returns `false` if
    /// it was not running.
    pub fn stop(&mut self) -> bool {
        let was_running = std::mem::replace(&mut self.running, false);
        self.cancel_in_flight();
        if was_running {
            info!(subsystem = "scheduler", "Orchestrator stopped");
        }
        was_running
    }

    pub fn pause(&mut self) -> bool {
        self.flags.pause()
    }

    pub fn resume(&mut self) -> bool {
        self.flags.resume()
    }

    // ─── Tick ───────────────────────────────────────────────────────────────

    /// Run one selection-and-dispatch pass.
    #[instrument(skip(self), fields(subsystem = "scheduler", component = "orchestrator", op = "tick", note_id = Empty, phase = Empty))]
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        if self.flags.is_paused() {
            return Ok(TickOutcome::Paused);
        }
        if self.flags.is_disabled() {
            return Ok(TickOutcome::Disabled);
        }
        if self.in_flight.is_some() {
            debug!("Request in flight, skipping tick");
            return Ok(TickOutcome::Busy);
        }

        let notes = self.directory.list_notes().await?;
        let just_activated = self.auto_activate(&notes).await;

        let Some(note_id) = self.select_stalest(&notes, &just_activated).await else {
            return Ok(TickOutcome::NoActiveNotes);
        };
        Span::current().record(logging::NOTE_ID, display(note_id));

        let Some(text) = self.store.load_note_text(note_id).await? else {
            debug!(note_id = %note_id, "Selected note no longer exists");
            return Ok(TickOutcome::NoteMissing(note_id));
        };
        if text.chars().count() < self.config.min_content_chars {
            debug!(note_id = %note_id, "Selected note too short to marinate");
            return Ok(TickOutcome::ContentTooShort(note_id));
        }

        let state = self
            .store
            .load_state(note_id)
            .await?
            .unwrap_or_else(|| MarinationState::new(note_id));
        Span::current().record(logging::PHASE, display(state.phase));
        self.dispatch(&state, &text);
        Ok(TickOutcome::Dispatched(note_id))
    }

    /// Activate idle notes that are long enough and have not been edited
    /// within the idle threshold. Returns the notes it activated; they
    /// become eligible for selection on the next tick.
    async fn auto_activate(&mut self, notes: &[NoteSummary]) -> Vec<Uuid> {
        let now = Utc::now();
        let mut activated = Vec::new();
        for note in notes {
            if self.effective_status(note) != NoteStatus::Idle
                || note.text_len < self.config.min_content_chars
                || !self.idle_long_enough(note, now)
            {
                continue;
            }
            debug!(note_id = %note.id, "Auto-activating idle note");
            match self.activate(note.id).await {
                Ok(()) => activated.push(note.id),
                Err(e) => warn!(note_id = %note.id, error = %e, "Auto-activation failed"),
            }
        }
        activated
    }

    fn effective_status(&self, note: &NoteSummary) -> NoteStatus {
        self.statuses.get(&note.id).copied().unwrap_or(note.status)
    }

    fn idle_long_enough(&self, note: &NoteSummary, now: DateTime<Utc>) -> bool {
        let last_edit = note.last_edited_at.max(self.last_edits.get(&note.id).copied());
        match last_edit {
            None => true,
            Some(edited) => (now - edited)
                .to_std()
                .map(|quiet| quiet >= self.config.idle_threshold)
                .unwrap_or(false),
        }
    }

    /// Active note with the oldest `last_marinated_at`; never-marinated
    /// notes come first, ties keep listing order. Notes whose state cannot
    /// be read are skipped for this tick.
    async fn select_stalest(&self, notes: &[NoteSummary], exclude: &[Uuid]) -> Option<Uuid> {
        let mut best: Option<(Option<DateTime<Utc>>, Uuid)> = None;

        for note in notes {
            if self.effective_status(note) != NoteStatus::Active || exclude.contains(&note.id) {
                continue;
            }
            let last = match self.store.load_state(note.id).await {
                Ok(state) => state.and_then(|s| s.last_marinated_at),
                Err(e) => {
                    warn!(note_id = %note.id, error = %e, "Unreadable marination state, skipping note");
                    continue;
                }
            };
            if best.map_or(true, |(best_last, _)| last < best_last) {
                best = Some((last, note.id));
            }
        }

        best.map(|(_, id)| id)
    }

    fn dispatch(&mut self, state: &MarinationState, text: &str) {
        let note_id = state.note_id;
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let prompt = build_prompt(state.phase, &state.history.recent()).render(text);
        let prompt_len = prompt.len();
        let mailbox = self.completion_tx.clone();

        let handle = GenerationRequest::new(Arc::clone(&self.generator))
            .with_grace(self.config.generator_grace)
            .send(prompt, true, self.config.request_timeout, move |outcome| {
                let completion = Completion {
                    request_id,
                    note_id,
                    outcome,
                };
                if mailbox.try_send(completion).is_err() {
                    warn!(request_id, note_id = %note_id, "Completion mailbox unavailable, result dropped");
                }
            });

        self.statuses.entry(note_id).or_insert(NoteStatus::Active);
        self.in_flight = Some(InFlight {
            request_id,
            note_id,
            handle,
            started: Instant::now(),
        });

        info!(
            request_id,
            note_id = %note_id,
            phase = %state.phase,
            prompt_len,
            generator = self.generator.name(),
            "Dispatched generation request"
        );
    }

    fn cancel_in_flight(&mut self) {
        if let Some(mut in_flight) = self.in_flight.take() {
            if in_flight.handle.cancel() {
                debug!(
                    request_id = in_flight.request_id,
                    note_id = %in_flight.note_id,
                    "Canceled in-flight request"
                );
            }
        }
        // A result that arrived before the cancel is now stale.
        while self.completion_rx.try_recv().is_ok() {}
    }

    // ─── Completions ────────────────────────────────────────────────────────

    /// Wait for the in-flight request to resolve.
    ///
    /// Pending forever while nothing is in flight; intended as a `select!`
    /// branch.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.completion_rx.recv().await
    }

    /// Apply a request result to the note it was dispatched for.
    #[instrument(skip(self, completion), fields(subsystem = "scheduler", component = "orchestrator", op = "complete", request_id = completion.request_id, note_id = %completion.note_id, duration_ms = Empty))]
    pub async fn handle_completion(&mut self, completion: Completion) {
        let in_flight = match self.in_flight.take() {
            Some(f) if f.request_id == completion.request_id => f,
            other => {
                self.in_flight = other;
                debug!("Discarding stale completion");
                return;
            }
        };
        let note_id = completion.note_id;
        let duration_ms = in_flight.started.elapsed().as_millis() as u64;
        Span::current().record(logging::DURATION_MS, duration_ms);

        if let Err(e) = &completion.outcome {
            if e.is_backend_unavailable() {
                self.events.emit(MarinationEvent::GenerationFailed {
                    note_id,
                    kind: FailureKind::BackendUnavailable,
                    error: e.to_string(),
                });
                self.disable(&e.to_string());
                return;
            }
        }

        match self.store.load_note_text(note_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("Note deleted while in flight, discarding result");
                self.forget_note(note_id).await;
                return;
            }
            Err(e) => {
                warn!(error = %e, "Could not confirm note still exists, discarding result");
                return;
            }
        }

        match completion.outcome {
            Ok(output) => {
                let suggestions = output
                    .structured
                    .as_ref()
                    .map(parse_suggestions)
                    .unwrap_or_default();
                self.apply_suggestions(note_id, suggestions, duration_ms).await;
            }
            Err(e) => {
                let kind = if e.is_timeout() {
                    FailureKind::Timeout
                } else {
                    FailureKind::Transient
                };
                warn!(error = %e, ?kind, "Generation cycle failed");
                self.events.emit(MarinationEvent::GenerationFailed {
                    note_id,
                    kind,
                    error: e.to_string(),
                });
            }
        }
    }

    async fn apply_suggestions(&mut self, note_id: Uuid, fresh: Vec<Suggestion>, duration_ms: u64) {
        let mut state = match self.store.load_state(note_id).await {
            Ok(state) => state.unwrap_or_else(|| MarinationState::new(note_id)),
            Err(e) => {
                warn!(error = %e, "Failed to load state, discarding result");
                return;
            }
        };

        let now = Utc::now();
        let suggestion_count = fresh.len();
        let expired_count = state.merge_suggestions(fresh, now);
        state.record_cycle(now);
        let should_wait = state.should_wait(self.config.marination_ceiling);

        self.persist(&state).await;
        info!(
            suggestion_count,
            expired_count,
            marination_count = state.marination_count,
            phase = %state.phase,
            duration_ms,
            "Marination cycle complete"
        );
        self.emit_suggestions(&state);

        if should_wait && self.note_status(note_id) == Some(NoteStatus::Active) {
            info!(
                marination_count = state.marination_count,
                "No suggestion accepted yet, note backing off"
            );
            self.set_status(note_id, NoteStatus::Waiting);
        }
    }

    fn disable(&mut self, reason: &str) {
        self.cancel_in_flight();
        if self.flags.disable(reason) {
            error!(
                subsystem = "scheduler",
                reason, "Generator backend unavailable, marination disabled"
            );
            self.events.emit(MarinationEvent::EngineDisabled {
                reason: reason.to_string(),
            });
        }
    }

    // ─── Note commands ──────────────────────────────────────────────────────

    /// Mark a note active and create its state if needed.
    ///
    /// Explicit activation also releases a `waiting` note, clearing its
    /// attempt counter. The caller is responsible for the follow-up tick.
    pub async fn activate_note(&mut self, note_id: Uuid) -> Result<()> {
        if self.store.load_note_text(note_id).await?.is_none() {
            return Err(Error::NoteNotFound(note_id));
        }
        self.activate(note_id).await
    }

    async fn activate(&mut self, note_id: Uuid) -> Result<()> {
        let from_waiting = self.note_status(note_id) == Some(NoteStatus::Waiting);

        match self.store.load_state(note_id).await? {
            None => self.persist(&MarinationState::new(note_id)).await,
            Some(mut state) if from_waiting => {
                state.reset_attempts();
                self.persist(&state).await;
            }
            Some(_) => {}
        }

        self.set_status(note_id, NoteStatus::Active);
        Ok(())
    }

    /// Mark a note idle. Its state is kept.
    pub fn deactivate_note(&mut self, note_id: Uuid) {
        self.set_status(note_id, NoteStatus::Idle);
    }

    /// Record a user edit. A `waiting` note returns to `idle` with its
    /// attempt counter cleared.
    pub async fn note_did_edit(&mut self, note_id: Uuid) -> Result<()> {
        let now = Utc::now();
        self.last_edits.insert(note_id, now);
        let was_waiting = self.note_status(note_id) == Some(NoteStatus::Waiting);

        if let Some(mut state) = self.store.load_state(note_id).await? {
            state.record_edit(now);
            if was_waiting {
                state.reset_attempts();
            }
            self.persist(&state).await;
        }

        if was_waiting {
            debug!(note_id = %note_id, "Edit released waiting note");
            self.set_status(note_id, NoteStatus::Idle);
        }
        Ok(())
    }

    /// Forget a deleted note: cancel its request and delete its state.
    pub async fn note_deleted(&mut self, note_id: Uuid) {
        if self.in_flight.as_ref().is_some_and(|f| f.note_id == note_id) {
            self.cancel_in_flight();
        }
        self.forget_note(note_id).await;
    }

    async fn forget_note(&mut self, note_id: Uuid) {
        self.statuses.remove(&note_id);
        self.last_edits.remove(&note_id);
        if let Err(e) = self.store.delete_state(note_id).await {
            warn!(note_id = %note_id, error = %e, "Failed to delete marination state");
        }
    }

    pub async fn accept_suggestion(
        &mut self,
        suggestion_id: Uuid,
        note_id: Uuid,
    ) -> Result<Resolution> {
        self.resolve(suggestion_id, note_id, Outcome::Accepted).await
    }

    pub async fn reject_suggestion(
        &mut self,
        suggestion_id: Uuid,
        note_id: Uuid,
    ) -> Result<Resolution> {
        self.resolve(suggestion_id, note_id, Outcome::Rejected).await
    }

    #[instrument(skip(self), fields(subsystem = "scheduler", component = "orchestrator", op = "resolve"))]
    async fn resolve(
        &mut self,
        suggestion_id: Uuid,
        note_id: Uuid,
        outcome: Outcome,
    ) -> Result<Resolution> {
        let mut state = self
            .store
            .load_state(note_id)
            .await?
            .ok_or(Error::NoteNotFound(note_id))?;
        let resolution = state.resolve_suggestion(suggestion_id, outcome, Utc::now())?;

        self.persist(&state).await;
        info!(
            suggestion_type = %resolution.suggestion.suggestion_type(),
            "Suggestion {}",
            outcome
        );
        self.emit_suggestions(&state);

        if let Some(phase) = resolution.phase_change {
            info!(phase = %phase, "Note advanced phase");
            self.events
                .emit(MarinationEvent::PhaseChanged { note_id, phase });
        }
        Ok(resolution)
    }

    // ─── Helpers ────────────────────────────────────────────────────────────

    fn set_status(&mut self, note_id: Uuid, status: NoteStatus) {
        if self.statuses.insert(note_id, status) == Some(status) {
            return;
        }
        debug!(note_id = %note_id, status = %status, "Note status changed");
        self.events
            .emit(MarinationEvent::StatusChanged { note_id, status });
    }

    fn emit_suggestions(&self, state: &MarinationState) {
        self.events.emit(MarinationEvent::SuggestionsUpdated {
            note_id: state.note_id,
            suggestions: state.pending_suggestions().cloned().collect(),
        });
    }

    async fn persist(&self, state: &MarinationState) {
        if let Err(e) = self.store.save_state(state).await {
            warn!(note_id = %state.note_id, error = %e, "Failed to save marination state");
        }
    }
}
