//! Parsing of structured generator output into typed suggestions.
//!
//! Invalid entries are dropped whole. Nothing here returns an error: a
//! response with no usable entries simply yields an empty batch.

use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use marinade_core::{Suggestion, SuggestionContent, SuggestionType};

/// Extract every valid suggestion from a structured response.
///
/// Accepts either `{"suggestions": [...]}` or a bare array. An entry is
/// kept only if it has a recognized `type`, a non-empty `reasoning`, and
/// every field its type requires. Unknown types are skipped silently.
pub fn parse_suggestions(response: &JsonValue) -> Vec<Suggestion> {
    let entries = candidate_entries(response);
    let parsed: Vec<Suggestion> = entries.iter().filter_map(parse_entry).collect();

    if parsed.len() < entries.len() {
        debug!(
            candidates = entries.len(),
            suggestion_count = parsed.len(),
            "Discarded invalid suggestion entries"
        );
    }
    parsed
}

fn candidate_entries(response: &JsonValue) -> &[JsonValue] {
    match response {
        JsonValue::Array(items) => items,
        JsonValue::Object(map) => map
            .get("suggestions")
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    }
}

fn parse_entry(entry: &JsonValue) -> Option<Suggestion> {
    let fields = entry.as_object()?;

    let type_name = fields.get("type")?.as_str()?;
    if SuggestionType::from_wire(type_name).is_none() {
        trace!(suggestion_type = type_name, "Skipping unknown suggestion type");
        return None;
    }

    let reasoning = fields.get("reasoning")?.as_str()?.trim();
    if reasoning.is_empty() {
        return None;
    }

    let mut content: SuggestionContent = match serde_json::from_value(entry.clone()) {
        Ok(content) => content,
        Err(e) => {
            trace!(suggestion_type = type_name, error = %e, "Entry missing required fields");
            return None;
        }
    };

    if !has_anchor_text(&content) {
        return None;
    }

    if let SuggestionContent::AdvancePhase {
        reasoning: phase_reasoning,
        ..
    } = &mut content
    {
        if phase_reasoning.trim().is_empty() {
            *phase_reasoning = reasoning.to_string();
        }
    }

    Some(Suggestion::new(content, reasoning))
}

// Fields the suggestion cannot be rendered or anchored without.
fn has_anchor_text(content: &SuggestionContent) -> bool {
    match content {
        SuggestionContent::Rewrite(edit) | SuggestionContent::Compression(edit) => {
            !edit.original.is_empty()
        }
        SuggestionContent::Append { text } | SuggestionContent::Question { text, .. } => {
            !text.trim().is_empty()
        }
        SuggestionContent::Insert {
            text,
            after_context,
        } => !text.is_empty() && !after_context.is_empty(),
        SuggestionContent::Critique(critique) => !critique.target_text.is_empty(),
        SuggestionContent::Promote { title, .. } => !title.trim().is_empty(),
        SuggestionContent::AdvancePhase { .. } => true,
    }
}
