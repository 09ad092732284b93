//! Core data models for marinade.
//!
//! These types are shared across all marinade crates and represent the core
//! domain entities: phases, suggestions and their typed content, the capped
//! suggestion history, and the per-note marination state that is persisted
//! by the store.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// PHASE TYPES
// =============================================================================

/// Ordered stage a note's marination progresses through.
///
/// Declaration order is the phase order; every phase except `Commit` has
/// exactly one successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotePhase {
    Ingest,
    Expand,
    Shape,
    Scope,
    Commit,
}

impl NotePhase {
    /// All phases in order.
    pub const ALL: [NotePhase; 5] = [
        NotePhase::Ingest,
        NotePhase::Expand,
        NotePhase::Shape,
        NotePhase::Scope,
        NotePhase::Commit,
    ];

    /// The phase that follows this one, if any.
    pub fn next(self) -> Option<NotePhase> {
        match self {
            NotePhase::Ingest => Some(NotePhase::Expand),
            NotePhase::Expand => Some(NotePhase::Shape),
            NotePhase::Shape => Some(NotePhase::Scope),
            NotePhase::Scope => Some(NotePhase::Commit),
            NotePhase::Commit => None,
        }
    }

    pub fn is_final(self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotePhase::Ingest => "ingest",
            NotePhase::Expand => "expand",
            NotePhase::Shape => "shape",
            NotePhase::Scope => "scope",
            NotePhase::Commit => "commit",
        }
    }
}

impl Default for NotePhase {
    fn default() -> Self {
        NotePhase::Ingest
    }
}

impl fmt::Display for NotePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotePhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NotePhase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown phase: {s}")))
    }
}

// =============================================================================
// STATUS TYPES
// =============================================================================

/// Per-note scheduling status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoteStatus {
    /// Not being marinated; eligible for auto-activation.
    #[default]
    Idle,
    /// Eligible for selection on the next tick.
    Active,
    /// Backed off after repeated unaccepted cycles; escaped by an edit or an
    /// explicit reactivation.
    Waiting,
}

impl NoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NoteStatus::Idle => "idle",
            NoteStatus::Active => "active",
            NoteStatus::Waiting => "waiting",
        }
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-supplied view of one note, listed once per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSummary {
    pub id: Uuid,
    pub status: NoteStatus,
    /// Length of the note text in characters.
    pub text_len: usize,
    /// Last edit the host knows about, if it tracks one.
    pub last_edited_at: Option<DateTime<Utc>>,
}

// =============================================================================
// SUGGESTION TYPES
// =============================================================================

/// Discriminant of [`SuggestionContent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SuggestionType {
    Rewrite,
    Append,
    Insert,
    Compression,
    Question,
    Critique,
    Promote,
    AdvancePhase,
}

impl SuggestionType {
    pub const ALL: [SuggestionType; 8] = [
        SuggestionType::Rewrite,
        SuggestionType::Append,
        SuggestionType::Insert,
        SuggestionType::Compression,
        SuggestionType::Question,
        SuggestionType::Critique,
        SuggestionType::Promote,
        SuggestionType::AdvancePhase,
    ];

    /// Wire name, as used in the `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionType::Rewrite => "rewrite",
            SuggestionType::Append => "append",
            SuggestionType::Insert => "insert",
            SuggestionType::Compression => "compression",
            SuggestionType::Question => "question",
            SuggestionType::Critique => "critique",
            SuggestionType::Promote => "promote",
            SuggestionType::AdvancePhase => "advancePhase",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn from_wire(s: &str) -> Option<Self> {
        SuggestionType::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Whether accepting this kind of suggestion edits the note text.
    pub fn is_text_edit(self) -> bool {
        matches!(
            self,
            SuggestionType::Rewrite
                | SuggestionType::Append
                | SuggestionType::Insert
                | SuggestionType::Compression
        )
    }
}

impl fmt::Display for SuggestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span replacement anchored by surrounding context (rewrite, compression).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanEdit {
    pub original: String,
    pub replacement: String,
    #[serde(default)]
    pub context_before: String,
    #[serde(default)]
    pub context_after: String,
}

/// How strongly a critique should be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CritiqueSeverity {
    Strong,
    Weak,
    Cut,
    Rethink,
}

/// Critique of an anchored passage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Critique {
    pub severity: CritiqueSeverity,
    pub target_text: String,
    pub critique_text: String,
    #[serde(default)]
    pub context_before: String,
    #[serde(default)]
    pub context_after: String,
}

/// Typed payload of a suggestion. The `type` tag is the discriminant, so a
/// suggestion's type can never disagree with its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SuggestionContent {
    Rewrite(SpanEdit),
    Append {
        text: String,
    },
    Insert {
        text: String,
        after_context: String,
    },
    Compression(SpanEdit),
    Question {
        text: String,
        #[serde(default)]
        choices: Vec<String>,
    },
    Critique(Critique),
    Promote {
        title: String,
        description: String,
    },
    AdvancePhase {
        next_phase: NotePhase,
        #[serde(default)]
        reasoning: String,
    },
}

impl SuggestionContent {
    pub fn suggestion_type(&self) -> SuggestionType {
        match self {
            SuggestionContent::Rewrite(_) => SuggestionType::Rewrite,
            SuggestionContent::Append { .. } => SuggestionType::Append,
            SuggestionContent::Insert { .. } => SuggestionType::Insert,
            SuggestionContent::Compression(_) => SuggestionType::Compression,
            SuggestionContent::Question { .. } => SuggestionType::Question,
            SuggestionContent::Critique(_) => SuggestionType::Critique,
            SuggestionContent::Promote { .. } => SuggestionType::Promote,
            SuggestionContent::AdvancePhase { .. } => SuggestionType::AdvancePhase,
        }
    }
}

/// Lifecycle state of a suggestion. Only `Pending` may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionState {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Expired,
}

/// Terminal outcome of a suggestion, as recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Accepted,
    Rejected,
    Expired,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::Rejected => "rejected",
            Outcome::Expired => "expired",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Outcome> for SuggestionState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Accepted => SuggestionState::Accepted,
            Outcome::Rejected => SuggestionState::Rejected,
            Outcome::Expired => SuggestionState::Expired,
        }
    }
}

/// A single proposed edit, question, critique, or phase/artifact action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: Uuid,
    pub content: SuggestionContent,
    pub reasoning: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub state: SuggestionState,
}

impl Suggestion {
    /// Create a pending suggestion with a fresh time-ordered id.
    pub fn new(content: SuggestionContent, reasoning: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            content,
            reasoning: reasoning.into(),
            created_at: Utc::now(),
            state: SuggestionState::Pending,
        }
    }

    pub fn suggestion_type(&self) -> SuggestionType {
        self.content.suggestion_type()
    }

    pub fn is_pending(&self) -> bool {
        self.state == SuggestionState::Pending
    }

    /// Move a pending suggestion to its terminal state.
    pub fn resolve(&mut self, outcome: Outcome) -> Result<()> {
        if !self.is_pending() {
            return Err(Error::SuggestionResolved(self.id));
        }
        self.state = outcome.into();
        Ok(())
    }
}

// =============================================================================
// HISTORY TYPES
// =============================================================================

/// Snapshot of a resolved suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub suggestion: Suggestion,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

/// Append-only history capped at [`defaults::HISTORY_CAP`] entries.
///
/// The oldest entries are dropped first. Prompt construction reads it only
/// through [`History::recent`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<HistoryEntry>", into = "Vec<HistoryEntry>")]
pub struct History {
    entries: VecDeque<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > defaults::HISTORY_CAP {
            self.entries.pop_front();
        }
    }

    /// The most recent [`defaults::RECENT_HISTORY_WINDOW`] entries, oldest first.
    pub fn recent(&self) -> Vec<HistoryEntry> {
        let skip = self
            .entries
            .len()
            .saturating_sub(defaults::RECENT_HISTORY_WINDOW);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Whether any retained entry was accepted.
    pub fn ever_accepted(&self) -> bool {
        self.entries.iter().any(|e| e.outcome == Outcome::Accepted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

impl From<Vec<HistoryEntry>> for History {
    fn from(entries: Vec<HistoryEntry>) -> Self {
        let mut history = History::new();
        for entry in entries {
            history.push(entry);
        }
        history
    }
}

impl From<History> for Vec<HistoryEntry> {
    fn from(history: History) -> Self {
        history.entries.into()
    }
}

// =============================================================================
// MARINATION STATE
// =============================================================================

/// Result of accepting or rejecting a suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The suggestion in its resolved state.
    pub suggestion: Suggestion,
    /// New phase when an accepted `advancePhase` moved the note forward.
    pub phase_change: Option<NotePhase>,
}

/// Per-note persisted marination state. Owned by exactly one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarinationState {
    pub note_id: Uuid,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub history: History,
    #[serde(default)]
    pub last_marinated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub marination_count: u32,
    #[serde(default)]
    pub last_user_edit_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phase: NotePhase,
    #[serde(default)]
    pub phase_round_count: u32,
}

impl MarinationState {
    pub fn new(note_id: Uuid) -> Self {
        Self {
            note_id,
            suggestions: Vec::new(),
            history: History::new(),
            last_marinated_at: None,
            marination_count: 0,
            last_user_edit_at: None,
            phase: NotePhase::Ingest,
            phase_round_count: 0,
        }
    }

    pub fn pending_suggestions(&self) -> impl Iterator<Item = &Suggestion> {
        self.suggestions.iter().filter(|s| s.is_pending())
    }

    /// Merge a freshly generated batch into the pending set.
    ///
    /// Non-pending suggestions are dropped (they already live in history).
    /// If the result exceeds [`defaults::SUGGESTION_CAP`], the oldest are
    /// expired and recorded in history. Returns the number expired.
    pub fn merge_suggestions(&mut self, fresh: Vec<Suggestion>, now: DateTime<Utc>) -> usize {
        self.suggestions.retain(Suggestion::is_pending);
        self.suggestions.extend(fresh);

        let overflow = self
            .suggestions
            .len()
            .saturating_sub(defaults::SUGGESTION_CAP);
        let expired: Vec<Suggestion> = self.suggestions.drain(..overflow).collect();
        for mut suggestion in expired {
            suggestion.state = SuggestionState::Expired;
            self.history.push(HistoryEntry {
                suggestion,
                outcome: Outcome::Expired,
                timestamp: now,
            });
        }
        overflow
    }

    /// Book-keeping after a completed generation cycle.
    pub fn record_cycle(&mut self, now: DateTime<Utc>) {
        self.last_marinated_at = Some(now);
        self.marination_count += 1;
        self.phase_round_count += 1;
    }

    /// Whether the note has used up its attempts without any acceptance.
    pub fn should_wait(&self, ceiling: u32) -> bool {
        self.marination_count >= ceiling && !self.history.ever_accepted()
    }

    pub fn record_edit(&mut self, now: DateTime<Utc>) {
        self.last_user_edit_at = Some(now);
    }

    /// Clear the consecutive-attempt counter.
    pub fn reset_attempts(&mut self) {
        self.marination_count = 0;
    }

    /// Move to `phase` and restart the round counter.
    pub fn advance_to(&mut self, phase: NotePhase) {
        self.phase = phase;
        self.phase_round_count = 0;
    }

    /// Resolve a pending suggestion and append it to history.
    ///
    /// An accepted `advancePhase` moves the note forward: to the suggested
    /// phase when it lies ahead, otherwise to the immediate successor.
    pub fn resolve_suggestion(
        &mut self,
        suggestion_id: Uuid,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        let suggestion = self
            .suggestions
            .iter_mut()
            .find(|s| s.id == suggestion_id)
            .ok_or(Error::SuggestionNotFound(suggestion_id))?;
        suggestion.resolve(outcome)?;
        let snapshot = suggestion.clone();

        self.history.push(HistoryEntry {
            suggestion: snapshot.clone(),
            outcome,
            timestamp: now,
        });

        let mut phase_change = None;
        if outcome == Outcome::Accepted {
            if let SuggestionContent::AdvancePhase { next_phase, .. } = &snapshot.content {
                let target = if *next_phase > self.phase {
                    Some(*next_phase)
                } else {
                    self.phase.next()
                };
                if let Some(target) = target {
                    self.advance_to(target);
                    phase_change = Some(target);
                }
            }
        }

        Ok(Resolution {
            suggestion: snapshot,
            phase_change,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn span(original: &str, replacement: &str) -> SpanEdit {
        SpanEdit {
            original: original.to_string(),
            replacement: replacement.to_string(),
            context_before: "before ".to_string(),
            context_after: " after".to_string(),
        }
    }

    fn all_variants() -> Vec<SuggestionContent> {
        vec![
            SuggestionContent::Rewrite(span("teh", "the")),
            SuggestionContent::Append {
                text: "A closing thought.".to_string(),
            },
            SuggestionContent::Insert {
                text: "An example.".to_string(),
                after_context: "first point.".to_string(),
            },
            SuggestionContent::Compression(span("very very long", "long")),
            SuggestionContent::Question {
                text: "Who is the audience?".to_string(),
                choices: vec!["engineers".to_string(), "managers".to_string()],
            },
            SuggestionContent::Critique(Critique {
                severity: CritiqueSeverity::Rethink,
                target_text: "we should rewrite everything".to_string(),
                critique_text: "Unsupported claim.".to_string(),
                context_before: String::new(),
                context_after: ".".to_string(),
            }),
            SuggestionContent::Promote {
                title: "Migration plan".to_string(),
                description: "Split into its own doc.".to_string(),
            },
            SuggestionContent::AdvancePhase {
                next_phase: NotePhase::Expand,
                reasoning: "Core idea is clear.".to_string(),
            },
        ]
    }

    fn entry(outcome: Outcome, n: usize) -> HistoryEntry {
        let mut suggestion = Suggestion::new(
            SuggestionContent::Append {
                text: format!("entry {n}"),
            },
            format!("reason {n}"),
        );
        suggestion.state = outcome.into();
        HistoryEntry {
            suggestion,
            outcome,
            timestamp: Utc::now(),
        }
    }

    fn pending(n: usize) -> Suggestion {
        Suggestion::new(
            SuggestionContent::Append {
                text: format!("s{n}"),
            },
            "r",
        )
    }

    #[test]
    fn test_phase_order_and_successors() {
        assert!(NotePhase::Ingest < NotePhase::Expand);
        assert!(NotePhase::Scope < NotePhase::Commit);
        assert_eq!(NotePhase::Ingest.next(), Some(NotePhase::Expand));
        assert_eq!(NotePhase::Scope.next(), Some(NotePhase::Commit));
        assert_eq!(NotePhase::Commit.next(), None);
        assert!(NotePhase::Commit.is_final());
    }

    #[test]
    fn test_phase_from_str() {
        assert_eq!("shape".parse::<NotePhase>().unwrap(), NotePhase::Shape);
        assert!("polish".parse::<NotePhase>().is_err());
    }

    #[test]
    fn test_suggestion_round_trip_all_variants() {
        for content in all_variants() {
            let suggestion = Suggestion::new(content, "because");
            let json = serde_json::to_string(&suggestion).unwrap();
            let decoded: Suggestion = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded, suggestion);
        }
    }

    #[test]
    fn test_content_tag_matches_type() {
        for content in all_variants() {
            let value = serde_json::to_value(&content).unwrap();
            assert_eq!(value["type"], content.suggestion_type().as_str());
        }
    }

    #[test]
    fn test_content_uses_camel_case_fields() {
        let content = SuggestionContent::Insert {
            text: "x".to_string(),
            after_context: "y".to_string(),
        };
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value["afterContext"], "y");

        let value = serde_json::to_value(SuggestionContent::Rewrite(span("a", "b"))).unwrap();
        assert_eq!(value["contextBefore"], "before ");
        assert_eq!(value["type"], "rewrite");
    }

    #[test]
    fn test_suggestion_type_wire_names() {
        assert_eq!(
            SuggestionType::from_wire("advancePhase"),
            Some(SuggestionType::AdvancePhase)
        );
        assert_eq!(SuggestionType::from_wire("summarize"), None);
        assert!(SuggestionType::Compression.is_text_edit());
        assert!(!SuggestionType::Promote.is_text_edit());
    }

    #[test]
    fn test_state_transitions_only_from_pending() {
        let mut suggestion = pending(0);
        suggestion.resolve(Outcome::Accepted).unwrap();
        assert_eq!(suggestion.state, SuggestionState::Accepted);

        let err = suggestion.resolve(Outcome::Rejected).unwrap_err();
        assert!(matches!(err, Error::SuggestionResolved(_)));
        assert_eq!(suggestion.state, SuggestionState::Accepted);
    }

    #[test]
    fn test_history_cap_keeps_most_recent_in_order() {
        let mut history = History::new();
        for n in 0..14 {
            history.push(entry(Outcome::Rejected, n));
        }
        assert_eq!(history.len(), defaults::HISTORY_CAP);
        let texts: Vec<String> = history.iter().map(|e| e.suggestion.reasoning.clone()).collect();
        let expected: Vec<String> = (4..14).map(|n| format!("reason {n}")).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_recent_history_window() {
        let mut history = History::new();
        assert!(history.recent().is_empty());

        for n in 0..3 {
            history.push(entry(Outcome::Rejected, n));
        }
        assert_eq!(history.recent().len(), 3);

        for n in 3..12 {
            history.push(entry(Outcome::Rejected, n));
        }
        let recent = history.recent();
        assert_eq!(recent.len(), defaults::RECENT_HISTORY_WINDOW);
        let reasons: Vec<&str> = recent.iter().map(|e| e.suggestion.reasoning.as_str()).collect();
        assert_eq!(
            reasons,
            vec!["reason 7", "reason 8", "reason 9", "reason 10", "reason 11"]
        );
    }

    #[test]
    fn test_history_deserialize_enforces_cap() {
        let entries: Vec<HistoryEntry> = (0..15).map(|n| entry(Outcome::Expired, n)).collect();
        let json = serde_json::to_string(&entries).unwrap();
        let history: History = serde_json::from_str(&json).unwrap();
        assert_eq!(history.len(), defaults::HISTORY_CAP);
    }

    #[test]
    fn test_merge_drops_resolved_and_keeps_pending() {
        let mut state = MarinationState::new(Uuid::new_v4());
        state.merge_suggestions(vec![pending(0), pending(1)], Utc::now());
        let first = state.suggestions[0].id;
        state
            .resolve_suggestion(first, Outcome::Rejected, Utc::now())
            .unwrap();

        let expired = state.merge_suggestions(vec![pending(2)], Utc::now());
        assert_eq!(expired, 0);
        assert_eq!(state.suggestions.len(), 2);
        assert!(state.suggestions.iter().all(Suggestion::is_pending));
        assert!(state.suggestions.iter().all(|s| s.id != first));
    }

    #[test]
    fn test_merge_caps_by_expiring_oldest() {
        let mut state = MarinationState::new(Uuid::new_v4());
        let batch: Vec<Suggestion> = (0..6).map(pending).collect();
        state.merge_suggestions(batch, Utc::now());
        let oldest: Vec<Uuid> = state.suggestions.iter().take(2).map(|s| s.id).collect();

        let expired = state.merge_suggestions((6..10).map(pending).collect(), Utc::now());
        assert_eq!(expired, 2);
        assert_eq!(state.suggestions.len(), defaults::SUGGESTION_CAP);
        assert!(state.suggestions.iter().all(|s| !oldest.contains(&s.id)));
        assert_eq!(state.history.len(), 2);
        assert!(state.history.iter().all(|e| e.outcome == Outcome::Expired
            && e.suggestion.state == SuggestionState::Expired));
    }

    #[test]
    fn test_record_cycle_and_wait_ceiling() {
        let mut state = MarinationState::new(Uuid::new_v4());
        let now = Utc::now();
        for _ in 0..5 {
            state.record_cycle(now);
        }
        assert_eq!(state.marination_count, 5);
        assert_eq!(state.phase_round_count, 5);
        assert_eq!(state.last_marinated_at, Some(now));
        assert!(state.should_wait(5));
        assert!(!state.should_wait(6));

        state.reset_attempts();
        assert!(!state.should_wait(5));
    }

    #[test]
    fn test_accepted_history_prevents_waiting() {
        let mut state = MarinationState::new(Uuid::new_v4());
        state.merge_suggestions(vec![pending(0)], Utc::now());
        let id = state.suggestions[0].id;
        state
            .resolve_suggestion(id, Outcome::Accepted, Utc::now())
            .unwrap();
        for _ in 0..5 {
            state.record_cycle(Utc::now());
        }
        assert!(!state.should_wait(5));
    }

    #[test]
    fn test_accept_advance_phase_resets_round_counter() {
        let mut state = MarinationState::new(Uuid::new_v4());
        state.record_cycle(Utc::now());
        state.record_cycle(Utc::now());
        let advance = Suggestion::new(
            SuggestionContent::AdvancePhase {
                next_phase: NotePhase::Expand,
                reasoning: "ready".to_string(),
            },
            "ready",
        );
        let id = advance.id;
        state.merge_suggestions(vec![advance], Utc::now());

        let resolution = state
            .resolve_suggestion(id, Outcome::Accepted, Utc::now())
            .unwrap();
        assert_eq!(resolution.phase_change, Some(NotePhase::Expand));
        assert_eq!(state.phase, NotePhase::Expand);
        assert_eq!(state.phase_round_count, 0);
        assert_eq!(state.marination_count, 2);
    }

    #[test]
    fn test_stale_advance_target_moves_to_successor() {
        let mut state = MarinationState::new(Uuid::new_v4());
        state.advance_to(NotePhase::Shape);
        let advance = Suggestion::new(
            SuggestionContent::AdvancePhase {
                next_phase: NotePhase::Expand,
                reasoning: String::new(),
            },
            "stale",
        );
        let id = advance.id;
        state.merge_suggestions(vec![advance], Utc::now());
        let resolution = state
            .resolve_suggestion(id, Outcome::Accepted, Utc::now())
            .unwrap();
        assert_eq!(resolution.phase_change, Some(NotePhase::Scope));
    }

    #[test]
    fn test_rejected_advance_phase_keeps_phase() {
        let mut state = MarinationState::new(Uuid::new_v4());
        let advance = Suggestion::new(
            SuggestionContent::AdvancePhase {
                next_phase: NotePhase::Expand,
                reasoning: String::new(),
            },
            "r",
        );
        let id = advance.id;
        state.merge_suggestions(vec![advance], Utc::now());
        let resolution = state
            .resolve_suggestion(id, Outcome::Rejected, Utc::now())
            .unwrap();
        assert_eq!(resolution.phase_change, None);
        assert_eq!(state.phase, NotePhase::Ingest);
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_suggestion() {
        let mut state = MarinationState::new(Uuid::new_v4());
        let missing = Uuid::new_v4();
        let err = state
            .resolve_suggestion(missing, Outcome::Accepted, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::SuggestionNotFound(id) if id == missing));
    }

    #[test]
    fn test_state_round_trip() {
        let mut state = MarinationState::new(Uuid::new_v4());
        state.merge_suggestions(vec![pending(0), pending(1)], Utc::now());
        let id = state.suggestions[0].id;
        state
            .resolve_suggestion(id, Outcome::Rejected, Utc::now())
            .unwrap();
        state.record_cycle(Utc::now());
        state.record_edit(Utc::now() - Duration::seconds(10));

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"noteId\""));
        assert!(json.contains("\"phaseRoundCount\""));
        let decoded: MarinationState = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_state_deserializes_with_missing_optional_fields() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"noteId":"{id}"}}"#);
        let state: MarinationState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, MarinationState::new(id));
    }
}
