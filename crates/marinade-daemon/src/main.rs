//! Marinade daemon.
//!
//! Runs the marination orchestrator over a directory of notes, using a local
//! Ollama server as the generator. Suggestions are written next to each note
//! as `<uuid>.marination.json`.

mod config;
mod watch;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marinade_core::MarinationEvent;
use marinade_db::FileStore;
use marinade_inference::OllamaGenerator;
use marinade_jobs::{Orchestrator, OrchestratorConfig, OrchestratorHandle};

use crate::config::DaemonConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logging configuration:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors
    //   RUST_LOG    - standard env filter (default: info for the marinade crates)
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "marinade_daemon=info,marinade_jobs=info,marinade_inference=info,marinade_db=info".into()
    });
    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("marinade-daemon.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let daemon_config = DaemonConfig::from_env();
    let orchestrator_config = OrchestratorConfig::from_env();
    let generator = OllamaGenerator::from_env();

    info!(
        data_dir = %daemon_config.data_dir.display(),
        ollama_url = generator.base_url(),
        model = generator.model(),
        tick_interval_secs = orchestrator_config.tick_interval.as_secs(),
        "Starting marinade daemon"
    );

    let store = Arc::new(FileStore::open(daemon_config.data_dir.clone()).await?);
    let orchestrator = Orchestrator::new(
        orchestrator_config,
        store.clone(),
        store.clone(),
        Arc::new(generator),
    );
    let handle = marinade_jobs::spawn(orchestrator);

    let event_logger = tokio::spawn(log_events(handle.clone()));
    let watcher = tokio::spawn(watch::watch_notes(
        store,
        handle.clone(),
        daemon_config.poll_interval,
    ));

    handle.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    watcher.abort();
    handle.shutdown().await?;
    event_logger.abort();

    info!("Marinade daemon stopped");
    Ok(())
}

/// Log every marination event until the bus closes.
async fn log_events(handle: OrchestratorHandle) {
    let mut events = handle.events();
    loop {
        let envelope = match events.recv().await {
            Ok(envelope) => envelope,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagged behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match &envelope.payload {
            MarinationEvent::StatusChanged { note_id, status } => {
                info!(note_id = %note_id, status = %status, "Note status changed");
            }
            MarinationEvent::PhaseChanged { note_id, phase } => {
                info!(note_id = %note_id, phase = %phase, "Note advanced phase");
            }
            MarinationEvent::SuggestionsUpdated {
                note_id,
                suggestions,
            } => {
                info!(
                    note_id = %note_id,
                    pending = suggestions.len(),
                    "Suggestions updated"
                );
            }
            MarinationEvent::GenerationFailed {
                note_id,
                kind,
                error,
            } => {
                warn!(note_id = %note_id, kind = ?kind, error = %error, "Generation failed");
            }
            MarinationEvent::EngineDisabled { reason } => {
                error!(reason = %reason, "Marination disabled; restart the daemon once the generator is reachable");
            }
        }
    }
}
