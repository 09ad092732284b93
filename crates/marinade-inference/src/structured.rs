//! Extraction of a JSON object from free-form generator output.
//!
//! Models often wrap JSON in a markdown fence, with or without a language
//! tag. The fence is stripped before parsing; anything still unparseable is
//! reported with a short preview instead of the whole response.

use serde_json::Value as JsonValue;

use marinade_core::defaults::MALFORMED_PREVIEW_CHARS;
use marinade_core::{Error, Result};

const FENCE: &str = "```";

/// Trim whitespace and remove an optional surrounding triple-backtick fence.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix(FENCE) else {
        return trimmed;
    };

    let body = match rest.split_once('\n') {
        Some((tag, body)) if is_language_tag(tag) => body,
        Some(_) => rest,
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };

    let body = body.trim_end();
    body.strip_suffix(FENCE).unwrap_or(body).trim()
}

fn is_language_tag(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse the generator's accumulated text as JSON.
///
/// Returns [`Error::MalformedResponse`] carrying a truncated preview of the
/// offending text when parsing fails.
pub fn extract_structured(text: &str) -> Result<JsonValue> {
    let body = strip_code_fence(text);
    serde_json::from_str(body).map_err(|e| {
        Error::MalformedResponse(format!(
            "{e}; response began: {:?}",
            preview(text, MALFORMED_PREVIEW_CHARS)
        ))
    })
}

/// The first `max_chars` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_untouched() {
        assert_eq!(strip_code_fence("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_fence_with_language_tag() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(text), "{\"a\": 1}");
    }

    #[test]
    fn test_fence_without_language_tag() {
        let text = "```\n[1, 2]\n```\n";
        assert_eq!(strip_code_fence(text), "[1, 2]");
    }

    #[test]
    fn test_single_line_fence() {
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn test_unterminated_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_structured_from_fenced_text() {
        let value = extract_structured("```json\n{\"suggestions\": []}\n```").unwrap();
        assert!(value["suggestions"].is_array());
    }

    #[test]
    fn test_extract_structured_failure_has_preview() {
        let garbage = format!("Sure! Here you go: {}", "x".repeat(500));
        let err = extract_structured(&garbage).unwrap_err();
        match err {
            Error::MalformedResponse(msg) => {
                assert!(msg.contains("Sure! Here you go"));
                assert!(msg.contains('…'));
                assert!(msg.len() < 400);
            }
            other => panic!("Expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_preview_short_text_not_cut() {
        assert_eq!(preview("  short  ", 10), "short");
        assert_eq!(preview("héllo wörld", 5), "héllo…");
    }
}
