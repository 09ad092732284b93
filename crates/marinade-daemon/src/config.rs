//! Daemon configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default notes directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "./notes";

/// Default interval between scans of the notes directory.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Directory holding `<uuid>.md` notes and their state files.
    pub data_dir: PathBuf,
    /// How often the directory is scanned for edits and deletions.
    pub poll_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl DaemonConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `MARINADE_DATA_DIR` | `./notes` | Notes directory |
    /// | `MARINADE_POLL_INTERVAL_SECS` | `2` | Directory scan interval |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("MARINADE_DATA_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            poll_interval: std::env::var("MARINADE_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(defaults.poll_interval),
        }
    }
}
