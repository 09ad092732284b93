//! Structured logging conventions for marinade.
//!
//! Spans carry `subsystem`, `component`, and `op` identity fields. Fields
//! whose value is only known partway through an operation are declared
//! empty on the span and filled in with [`tracing::Span::record`] under the
//! names below.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Engine disabled, requires operator attention |
//! | WARN  | Recoverable issue: failed cycle, dropped write, malformed output |
//! | INFO  | Lifecycle events (start, stop, pause), cycle completions |
//! | DEBUG | Decision points: selection, skipped ticks, status changes |
//! | TRACE | Per-item iteration: parsed entries, stream deltas |

/// Note UUID selected by a tick.
pub const NOTE_ID: &str = "note_id";

/// Marination phase the selected note was dispatched in.
pub const PHASE: &str = "phase";

/// Wall-clock duration of a generation request in milliseconds.
pub const DURATION_MS: &str = "duration_ms";
