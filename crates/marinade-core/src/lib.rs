//! # marinade-core
//!
//! Core types, traits, and abstractions for the marinade suggestion engine.
//!
//! This crate provides the foundational data structures (phases, suggestions,
//! history, per-note marination state) and the trait definitions for the
//! external collaborators (store, note directory, text generator) that the
//! other marinade crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventBus, MarinationEvent};
pub use models::*;
pub use traits::*;
