//! Error types for marinade.

use thiserror::Error;

/// Result type alias using marinade's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Message fragments that identify a generator backend that cannot be reached
/// at all, as opposed to one that failed a single turn.
const BACKEND_UNAVAILABLE_MARKERS: &[&str] = &[
    "executable not found",
    "no such file or directory",
    "connection refused",
    "failed to start",
    "backend unavailable",
];

/// Core error type for marinade operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found (or deleted)
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// Suggestion not found on the given note
    #[error("Suggestion not found: {0}")]
    SuggestionNotFound(uuid::Uuid),

    /// Suggestion is no longer pending and cannot change state again
    #[error("Suggestion already resolved: {0}")]
    SuggestionResolved(uuid::Uuid),

    /// The text generator could not be started or reached at all
    #[error("Generator backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Inference/generation failed for this turn
    #[error("Inference error: {0}")]
    Inference(String),

    /// Generation did not finish before the request deadline
    #[error("Generation timed out after {0}s")]
    Timeout(u64),

    /// Generator output could not be parsed as the expected structure
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the generator backend cannot be used at all.
    ///
    /// Besides the dedicated variant, inference errors whose message carries
    /// one of the known "cannot start / cannot connect" markers also count.
    pub fn is_backend_unavailable(&self) -> bool {
        match self {
            Error::BackendUnavailable(_) => true,
            Error::Inference(msg) | Error::Request(msg) => {
                let lower = msg.to_lowercase();
                BACKEND_UNAVAILABLE_MARKERS
                    .iter()
                    .any(|marker| lower.contains(marker))
            }
            _ => false,
        }
    }

    /// True when the request deadline fired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// True for errors after which normal scheduling simply continues.
    pub fn is_transient(&self) -> bool {
        !self.is_backend_unavailable()
            && matches!(
                self,
                Error::Inference(_)
                    | Error::Timeout(_)
                    | Error::MalformedResponse(_)
                    | Error::Request(_)
            )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Error::BackendUnavailable(e.to_string())
        } else if e.is_timeout() {
            Error::Request(format!("timed out: {e}"))
        } else {
            Error::Request(e.to_string())
        }
    }
}
