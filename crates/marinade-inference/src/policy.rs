//! Phase policies: `(phase, recent history) → prompt spec`.
//!
//! Stateless. A policy never reads or writes persisted state; callers pass
//! in the bounded recent-history window and the note text.

use serde_json::{json, Value as JsonValue};

use marinade_core::defaults::{SUGGESTIONS_PER_CYCLE_MAX, SUGGESTIONS_PER_CYCLE_MIN};
use marinade_core::{HistoryEntry, NotePhase, SuggestionType};

/// Longest reasoning excerpt rendered per history bullet.
const HISTORY_REASONING_CHARS: usize = 120;

/// Phase-specific prompting strategy and advancement rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhasePolicy {
    pub phase: NotePhase,
    /// One-line goal of the phase.
    pub focus: &'static str,
    /// What the generator should look for in the note.
    pub instructions: &'static str,
    /// When to propose `advancePhase`. `None` for the final phase.
    pub advance_when: Option<&'static str>,
    /// Suggestion types the phase steers the generator towards. Other
    /// types are still valid responses.
    pub preferred_types: &'static [SuggestionType],
}

impl PhasePolicy {
    pub fn for_phase(phase: NotePhase) -> Self {
        use SuggestionType::*;

        match phase {
            NotePhase::Ingest => Self {
                phase,
                focus: "Understand what the writer is trying to capture.",
                instructions: "Ask clarifying questions about intent and audience, \
                    add short appended notes for obvious gaps, and flag passages \
                    that are confusing. Do not polish wording yet.",
                advance_when: Some(
                    "the core idea and its audience are clear from the note itself.",
                ),
                preferred_types: &[Question, Append, Critique, AdvancePhase],
            },
            NotePhase::Expand => Self {
                phase,
                focus: "Grow the idea.",
                instructions: "Propose additions: missing examples, counterpoints, \
                    next steps, and open questions worth answering. Insert new \
                    material next to the passage it extends.",
                advance_when: Some(
                    "the note covers the main angles and further additions would be filler.",
                ),
                preferred_types: &[Append, Insert, Question, AdvancePhase],
            },
            NotePhase::Shape => Self {
                phase,
                focus: "Give the note structure.",
                instructions: "Reorder and rewrite for flow, merge repeated points, \
                    tighten loose passages, and critique weak arguments.",
                advance_when: Some("the note reads in a sensible order without repetition."),
                preferred_types: &[Rewrite, Insert, Compression, Critique, AdvancePhase],
            },
            NotePhase::Scope => Self {
                phase,
                focus: "Cut the note down to what matters.",
                instructions: "Compress verbose passages, mark tangents for cutting, \
                    and question anything that does not serve the main point.",
                advance_when: Some("every remaining passage earns its place."),
                preferred_types: &[Compression, Critique, Question, Rewrite, AdvancePhase],
            },
            NotePhase::Commit => Self {
                phase,
                focus: "Finish the note.",
                instructions: "Make final wording fixes and propose promoting the \
                    note, or a part of it, into a standalone artifact.",
                advance_when: None,
                preferred_types: &[Rewrite, Compression, Promote],
            },
        }
    }

    pub fn prefers(&self, suggestion_type: SuggestionType) -> bool {
        self.preferred_types.contains(&suggestion_type)
    }
}

/// Everything the request layer needs to ask for one batch of suggestions.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSpec {
    pub phase: NotePhase,
    /// Role and response contract.
    pub system: String,
    /// Phase instructions, advancement rule, and rendered history.
    pub instructions: String,
    /// JSON schema the response must satisfy.
    pub response_schema: JsonValue,
}

impl PromptSpec {
    /// The full prompt for `note_text`.
    pub fn render(&self, note_text: &str) -> String {
        format!(
            "{system}\n\n{instructions}\n\nNOTE:\n<<<\n{note}\n>>>\n\n\
             Respond with a single JSON object matching this schema and nothing else:\n{schema}",
            system = self.system,
            instructions = self.instructions,
            note = note_text,
            schema = self.response_schema,
        )
    }
}

/// Build the prompt spec for a note in `phase` with the given recent history.
pub fn build_prompt(phase: NotePhase, recent_history: &[HistoryEntry]) -> PromptSpec {
    let policy = PhasePolicy::for_phase(phase);

    let system = format!(
        "You are a patient editor helping a writer develop a rough note. \
         Return between {min} and {max} suggestions. Every suggestion has a \
         \"type\" and a \"reasoning\" explaining why it helps. Quote text from \
         the note exactly when a field refers to it, and include a few words of \
         surrounding context so the passage can be found again after edits.",
        min = SUGGESTIONS_PER_CYCLE_MIN,
        max = SUGGESTIONS_PER_CYCLE_MAX,
    );

    let preferred: Vec<&str> = policy.preferred_types.iter().map(|t| t.as_str()).collect();
    let mut instructions = format!(
        "PHASE: {phase}\nGOAL: {focus}\n{body}\nFavor these suggestion types: {preferred}.",
        phase = phase,
        focus = policy.focus,
        body = policy.instructions,
        preferred = preferred.join(", "),
    );

    match (policy.advance_when, phase.next()) {
        (Some(condition), Some(next)) => instructions.push_str(&format!(
            "\nSuggest advancePhase with nextPhase \"{next}\" only when {condition}"
        )),
        _ => instructions.push_str("\nThis is the final phase; never suggest advancePhase."),
    }

    if !recent_history.is_empty() {
        instructions.push_str(
            "\n\nRecent suggestions and how the writer responded. \
             Do not repeat rejected ideas:\n",
        );
        instructions.push_str(&render_history(recent_history));
    }

    PromptSpec {
        phase,
        system,
        instructions,
        response_schema: response_schema(),
    }
}

/// One bullet per entry: `- type (outcome): reasoning`.
pub fn render_history(entries: &[HistoryEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            format!(
                "- {} ({}): {}",
                entry.suggestion.suggestion_type(),
                entry.outcome,
                excerpt(&entry.suggestion.reasoning, HISTORY_REASONING_CHARS),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat,
    }
}

/// Response-shape contract shared by every phase: one variant per
/// suggestion type.
pub fn response_schema() -> JsonValue {
    let variants: Vec<JsonValue> = SuggestionType::ALL.into_iter().map(variant_schema).collect();

    json!({
        "type": "object",
        "required": ["suggestions"],
        "properties": {
            "suggestions": {
                "type": "array",
                "minItems": SUGGESTIONS_PER_CYCLE_MIN,
                "maxItems": SUGGESTIONS_PER_CYCLE_MAX,
                "items": { "oneOf": variants }
            }
        }
    })
}

fn variant_schema(suggestion_type: SuggestionType) -> JsonValue {
    let (required, extra): (&[&str], JsonValue) = match suggestion_type {
        SuggestionType::Rewrite | SuggestionType::Compression => (
            &["original", "replacement"],
            json!({
                "original": {"type": "string"},
                "replacement": {"type": "string"},
                "contextBefore": {"type": "string"},
                "contextAfter": {"type": "string"}
            }),
        ),
        SuggestionType::Append => (&["text"], json!({"text": {"type": "string"}})),
        SuggestionType::Insert => (
            &["text", "afterContext"],
            json!({
                "text": {"type": "string"},
                "afterContext": {"type": "string"}
            }),
        ),
        SuggestionType::Question => (
            &["text"],
            json!({
                "text": {"type": "string"},
                "choices": {"type": "array", "items": {"type": "string"}}
            }),
        ),
        SuggestionType::Critique => (
            &["severity", "targetText", "critiqueText"],
            json!({
                "severity": {"enum": ["strong", "weak", "cut", "rethink"]},
                "targetText": {"type": "string"},
                "critiqueText": {"type": "string"},
                "contextBefore": {"type": "string"},
                "contextAfter": {"type": "string"}
            }),
        ),
        SuggestionType::Promote => (
            &["title", "description"],
            json!({
                "title": {"type": "string"},
                "description": {"type": "string"}
            }),
        ),
        SuggestionType::AdvancePhase => {
            let phases: Vec<&str> = NotePhase::ALL.iter().map(|p| p.as_str()).collect();
            (&["nextPhase"], json!({"nextPhase": {"enum": phases}}))
        }
    };

    let mut properties = json!({
        "type": {"const": suggestion_type.as_str()},
        "reasoning": {"type": "string"}
    });
    if let (Some(base), Some(more)) = (properties.as_object_mut(), extra.as_object()) {
        base.extend(more.clone());
    }

    let mut all_required = vec!["type", "reasoning"];
    all_required.extend_from_slice(required);

    json!({
        "type": "object",
        "required": all_required,
        "properties": properties
    })
}
