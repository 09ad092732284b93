//! Engine-wide pause and disable flags.
//!
//! The orchestrator owns the only writer; handles hold clones for lock-free
//! reads from other tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

/// Shared pause/disable state.
#[derive(Debug, Clone, Default)]
pub struct PauseState {
    paused: Arc<AtomicBool>,
    disabled: Arc<AtomicBool>,
    disabled_reason: Arc<Mutex<Option<String>>>,
}

impl PauseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// Why the engine was disabled, if it was.
    pub fn disabled_reason(&self) -> Option<String> {
        match self.disabled_reason.lock() {
            Ok(reason) => reason.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns `true` if the state changed.
    pub(crate) fn pause(&self) -> bool {
        let changed = !self.paused.swap(true, Ordering::SeqCst);
        if changed {
            info!("Marination paused");
        }
        changed
    }

    /// Returns `true` if the state changed.
    pub(crate) fn resume(&self) -> bool {
        let changed = self.paused.swap(false, Ordering::SeqCst);
        if changed {
            info!("Marination resumed");
        }
        changed
    }

    /// Enter the terminal disabled state. Only the first call records a
    /// reason; returns `true` for that call.
    pub(crate) fn disable(&self, reason: &str) -> bool {
        if self.disabled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let mut slot = match self.disabled_reason.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(reason.to_string());
        true
    }
}
