//! Orchestrator configuration.

use std::time::Duration;

use marinade_core::defaults;

/// Configuration for the marination orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Period of the automatic tick while started.
    pub tick_interval: Duration,
    /// How long a note must go unedited before auto-activation.
    pub idle_threshold: Duration,
    /// Minimum note length, in characters, worth marinating.
    pub min_content_chars: usize,
    /// Unaccepted cycles before a note backs off to `waiting`.
    pub marination_ceiling: u32,
    /// Deadline for one generation request.
    pub request_timeout: Duration,
    /// Delay between generator start and prompt transmission.
    pub generator_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(defaults::TICK_INTERVAL_SECS),
            idle_threshold: Duration::from_secs(defaults::IDLE_THRESHOLD_SECS),
            min_content_chars: defaults::MIN_CONTENT_CHARS,
            marination_ceiling: defaults::MARINATION_CEILING,
            request_timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
            generator_grace: Duration::from_millis(defaults::GENERATOR_GRACE_MS),
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `MARINADE_TICK_INTERVAL_SECS` | `45` | Automatic tick period |
    /// | `MARINADE_IDLE_THRESHOLD_SECS` | `30` | Quiet time before auto-activation |
    /// | `MARINADE_MIN_CONTENT_CHARS` | `50` | Minimum note length to marinate |
    /// | `MARINADE_MARINATION_CEILING` | `5` | Unaccepted cycles before `waiting` |
    /// | `MARINADE_REQUEST_TIMEOUT_SECS` | `120` | Generation request deadline |
    /// | `MARINADE_GENERATOR_GRACE_MS` | `500` | Delay before sending the prompt |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            tick_interval: env_secs("MARINADE_TICK_INTERVAL_SECS")
                .map(|d| d.max(Duration::from_secs(1)))
                .unwrap_or(defaults.tick_interval),
            idle_threshold: env_secs("MARINADE_IDLE_THRESHOLD_SECS")
                .unwrap_or(defaults.idle_threshold),
            min_content_chars: env_parse("MARINADE_MIN_CONTENT_CHARS")
                .unwrap_or(defaults.min_content_chars),
            marination_ceiling: env_parse::<u32>("MARINADE_MARINATION_CEILING")
                .map(|c| c.max(1))
                .unwrap_or(defaults.marination_ceiling),
            request_timeout: env_secs("MARINADE_REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout),
            generator_grace: env_parse("MARINADE_GENERATOR_GRACE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.generator_grace),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = threshold;
        self
    }

    pub fn with_min_content_chars(mut self, chars: usize) -> Self {
        self.min_content_chars = chars;
        self
    }

    pub fn with_marination_ceiling(mut self, ceiling: u32) -> Self {
        self.marination_ceiling = ceiling;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_generator_grace(mut self, grace: Duration) -> Self {
        self.generator_grace = grace;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse(name).map(Duration::from_secs)
}
