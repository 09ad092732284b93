//! # marinade-inference
//!
//! Everything between a note and the text generator.
//!
//! This crate provides:
//! - Phase policies that turn `(phase, recent history)` into a prompt spec
//! - The single-use [`GenerationRequest`] lifecycle (start, stream, timeout,
//!   cancel, structured extraction)
//! - Parsing of structured generator output into typed suggestions
//! - An Ollama streaming backend (default feature `ollama`)
//! - A scripted backend for tests (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use marinade_core::{NotePhase, TextGenerator};
//! use marinade_inference::{build_prompt, GenerationRequest, OllamaGenerator};
//!
//! # async fn run() {
//! let generator: Arc<dyn TextGenerator> = Arc::new(OllamaGenerator::from_env());
//! let prompt = build_prompt(NotePhase::Ingest, &[]).render("my rough note");
//! let _handle = GenerationRequest::new(generator).send(
//!     prompt,
//!     true,
//!     Duration::from_secs(120),
//!     |outcome| println!("{:?}", outcome.map(|o| o.text)),
//! );
//! # }
//! ```

pub mod parser;
pub mod policy;
pub mod request;
pub mod structured;

#[cfg(feature = "ollama")]
pub mod ollama;

// Scripted generator for deterministic tests
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use marinade_core::*;

#[cfg(feature = "ollama")]
pub use ollama::OllamaGenerator;

pub use parser::parse_suggestions;
pub use policy::{build_prompt, render_history, PhasePolicy, PromptSpec};
pub use request::{GenerationOutput, GenerationRequest, RequestHandle, RequestOutcome, RequestState};
pub use structured::{extract_structured, preview, strip_code_fence};
