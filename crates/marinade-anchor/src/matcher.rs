//! Literal span search with context disambiguation.
//!
//! Generated suggestions quote the text they target plus a little of what
//! surrounded it. By the time a suggestion is rendered the document may have
//! changed, so the quoted context is scored rather than required:
//!
//! 1. Find every literal occurrence of the target.
//! 2. One occurrence wins outright; context is not consulted.
//! 3. Several occurrences are scored by how well the text around each one
//!    agrees with the quoted context; the highest score wins and ties go to
//!    the earliest occurrence.

use std::ops::Range;

/// Score awarded when the text around a candidate equals the quoted context
/// exactly.
pub const EXACT_CONTEXT_BONUS: usize = 100;

/// Locate `original` in `document`, using the quoted context to choose between
/// repeated occurrences.
///
/// Returns the byte range of the chosen occurrence, or `None` when the text is
/// absent (or `original` is empty).
pub fn find_span(
    original: &str,
    context_before: &str,
    context_after: &str,
    document: &str,
) -> Option<Range<usize>> {
    if original.is_empty() {
        return None;
    }

    let mut occurrences = document
        .match_indices(original)
        .map(|(start, _)| start..start + original.len());

    let first = occurrences.next()?;
    let Some(second) = occurrences.next() else {
        return Some(first);
    };

    let mut best = first.clone();
    let mut best_score = context_score(document, &first, context_before, context_after);
    for candidate in std::iter::once(second).chain(occurrences) {
        let score = context_score(document, &candidate, context_before, context_after);
        tracing::trace!(start = candidate.start, score, "Scored anchor candidate");
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    Some(best)
}

/// Context agreement for the occurrence at `span`.
///
/// Each non-empty context contributes [`EXACT_CONTEXT_BONUS`] on an exact
/// match, otherwise the number of characters that agree counting outward
/// from the occurrence.
pub fn context_score(
    document: &str,
    span: &Range<usize>,
    context_before: &str,
    context_after: &str,
) -> usize {
    before_score(&document[..span.start], context_before)
        + after_score(&document[span.end..], context_after)
}

fn before_score(preceding: &str, context: &str) -> usize {
    if context.is_empty() {
        return 0;
    }
    let actual = last_chars(preceding, context.chars().count());
    if actual == context {
        return EXACT_CONTEXT_BONUS;
    }
    actual
        .chars()
        .rev()
        .zip(context.chars().rev())
        .take_while(|(a, b)| a == b)
        .count()
}

fn after_score(following: &str, context: &str) -> usize {
    if context.is_empty() {
        return 0;
    }
    let actual = first_chars(following, context.chars().count());
    if actual == context {
        return EXACT_CONTEXT_BONUS;
    }
    actual
        .chars()
        .zip(context.chars())
        .take_while(|(a, b)| a == b)
        .count()
}

/// The last `n` characters of `s` (all of `s` if shorter).
fn last_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((start, _)) => &s[start..],
        None => s,
    }
}

/// The first `n` characters of `s` (all of `s` if shorter).
fn first_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}
