//! Centralized default constants for the marinade system.
//!
//! **This module is the single source of truth** for all shared default values.
//! All crates should reference these constants instead of defining their own
//! magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section.

// =============================================================================
// SCHEDULING
// =============================================================================

/// Interval between scheduler ticks in seconds.
pub const TICK_INTERVAL_SECS: u64 = 45;

/// A note must have been left alone this long before it is auto-activated.
pub const IDLE_THRESHOLD_SECS: u64 = 30;

/// Minimum note length (in characters) eligible for marination.
pub const MIN_CONTENT_CHARS: usize = 50;

/// Completed cycles without any accepted suggestion before a note backs off
/// into the waiting state.
pub const MARINATION_CEILING: u32 = 5;

// =============================================================================
// SUGGESTIONS
// =============================================================================

/// Maximum suggestions kept per note; overflow is expired oldest-first.
pub const SUGGESTION_CAP: usize = 8;

/// Maximum history entries kept per note (FIFO eviction).
pub const HISTORY_CAP: usize = 10;

/// Number of most recent history entries rendered into prompts.
pub const RECENT_HISTORY_WINDOW: usize = 5;

/// Minimum suggestions requested from the generator per cycle.
pub const SUGGESTIONS_PER_CYCLE_MIN: usize = 2;

/// Maximum suggestions requested from the generator per cycle.
pub const SUGGESTIONS_PER_CYCLE_MAX: usize = 4;

// =============================================================================
// GENERATION
// =============================================================================

/// Per-request timeout in seconds. Last-resort safety net, always an error.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Delay between starting a generator session and sending the prompt.
pub const GENERATOR_GRACE_MS: u64 = 500;

/// Characters of unparseable output kept in a malformed-response error.
pub const MALFORMED_PREVIEW_CHARS: usize = 200;

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model name (Ollama).
pub const GEN_MODEL: &str = "gpt-oss:20b";

/// Timeout for the backend reachability probe in seconds.
pub const PROBE_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// EVENTS
// =============================================================================

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Capacity of the orchestrator command channel.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_are_consistent() {
        assert!(RECENT_HISTORY_WINDOW <= HISTORY_CAP);
        assert!(SUGGESTIONS_PER_CYCLE_MAX <= SUGGESTION_CAP);
        assert!(SUGGESTIONS_PER_CYCLE_MIN <= SUGGESTIONS_PER_CYCLE_MAX);
    }

    #[test]
    fn test_grace_delay_shorter_than_timeout() {
        assert!(GENERATOR_GRACE_MS < REQUEST_TIMEOUT_SECS * 1000);
    }

    #[test]
    fn test_default_url_is_localhost() {
        assert!(OLLAMA_URL.contains("127.0.0.1"));
    }
}
