//! # marinade-db
//!
//! Storage for marinade: per-note marination state and the notes themselves.
//!
//! Two implementations of [`MarinationStore`] + [`NoteDirectory`]:
//! - [`MemoryStore`]: in-process maps, for tests and embedding hosts
//! - [`FileStore`]: a directory of `<uuid>.md` notes with
//!   `<uuid>.marination.json` state files written atomically
//!
//! Both serialize writes per note, so a `load_state` issued after a
//! `save_state` returns observes that write.

pub mod file_store;
pub mod memory;

pub use file_store::FileStore;
pub use memory::MemoryStore;

// Re-export core types
pub use marinade_core::{MarinationState, MarinationStore, NoteDirectory, NoteSummary};
