//! Mapping suggestion content onto a concrete document.

use std::ops::Range;

use marinade_core::SuggestionContent;

use crate::matcher::find_span;

/// Where a suggestion lands in the current document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Replace `range` with `replacement` (rewrite, compression).
    Replace {
        range: Range<usize>,
        replacement: String,
    },
    /// Insert `text` at byte offset `at` (insert, append).
    Insert { at: usize, text: String },
    /// Mark `range` without changing it (critique).
    Highlight { range: Range<usize> },
    /// Not tied to any text (question, promote, advancePhase).
    Unanchored,
}

/// Resolve `content` against `document`.
///
/// Returns `None` when the suggestion targets text that can no longer be
/// found; such suggestions are not rendered.
pub fn locate(content: &SuggestionContent, document: &str) -> Option<Anchor> {
    match content {
        SuggestionContent::Rewrite(edit) | SuggestionContent::Compression(edit) => {
            let range = find_span(
                &edit.original,
                &edit.context_before,
                &edit.context_after,
                document,
            )?;
            Some(Anchor::Replace {
                range,
                replacement: edit.replacement.clone(),
            })
        }
        SuggestionContent::Critique(critique) => {
            let range = find_span(
                &critique.target_text,
                &critique.context_before,
                &critique.context_after,
                document,
            )?;
            Some(Anchor::Highlight { range })
        }
        SuggestionContent::Insert {
            text,
            after_context,
        } => {
            let range = find_span(after_context, "", "", document)?;
            Some(Anchor::Insert {
                at: range.end,
                text: text.clone(),
            })
        }
        SuggestionContent::Append { text } => Some(Anchor::Insert {
            at: document.len(),
            text: append_separator(document, text),
        }),
        SuggestionContent::Question { .. }
        | SuggestionContent::Promote { .. }
        | SuggestionContent::AdvancePhase { .. } => Some(Anchor::Unanchored),
    }
}

/// Apply a text-edit suggestion, returning the new document.
///
/// `None` for suggestions that do not edit text or whose anchor is gone.
pub fn apply(content: &SuggestionContent, document: &str) -> Option<String> {
    match locate(content, document)? {
        Anchor::Replace { range, replacement } => {
            let mut edited = document.to_string();
            edited.replace_range(range, &replacement);
            Some(edited)
        }
        Anchor::Insert { at, text } => {
            let mut edited = document.to_string();
            edited.insert_str(at, &text);
            Some(edited)
        }
        Anchor::Highlight { .. } | Anchor::Unanchored => None,
    }
}

// Appended text starts on its own line.
fn append_separator(document: &str, text: &str) -> String {
    if document.is_empty() || document.ends_with('\n') || text.starts_with('\n') {
        text.to_string()
    } else {
        format!("\n{text}")
    }
}
