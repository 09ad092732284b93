//! # marinade-jobs
//!
//! The marination scheduler.
//!
//! An [`Orchestrator`] periodically picks the stalest active note, asks the
//! text generator for suggestions suited to the note's phase, and merges the
//! result into the note's state. At most one generation request is in
//! flight at any time.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use marinade_db::MemoryStore;
//! use marinade_inference::OllamaGenerator;
//! use marinade_jobs::{Orchestrator, OrchestratorConfig};
//!
//! # async fn run() -> marinade_core::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let orchestrator = Orchestrator::new(
//!     OrchestratorConfig::from_env(),
//!     store.clone(),
//!     store,
//!     Arc::new(OllamaGenerator::from_env()),
//! );
//! let handle = marinade_jobs::spawn(orchestrator);
//! handle.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod orchestrator;
pub mod pause;
pub mod runner;

pub use config::OrchestratorConfig;
pub use orchestrator::{Completion, EngineStatus, Orchestrator, TickOutcome};
pub use pause::PauseState;
pub use runner::{spawn, OrchestratorHandle};
