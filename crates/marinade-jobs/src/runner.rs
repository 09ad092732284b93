//! Orchestrator task and the handle hosts use to drive it.
//!
//! The spawned task is the orchestrator's only owner. It waits on three
//! sources: host commands, the completion mailbox, and the tick timer
//! (armed only while started). Commands are processed in order and each
//! one is acknowledged after it has taken effect.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use marinade_core::defaults::COMMAND_CHANNEL_CAPACITY;
use marinade_core::events::EventEnvelope;
use marinade_core::{Error, EventBus, Resolution, Result};

use crate::orchestrator::{EngineStatus, Orchestrator, TickOutcome};
use crate::pause::PauseState;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Start(Reply<bool>),
    Stop(Reply<bool>),
    Tick(Reply<TickOutcome>),
    Pause(Reply<bool>),
    Resume(Reply<bool>),
    Activate(Uuid, Reply<()>),
    Deactivate(Uuid, Reply<()>),
    DidEdit(Uuid, Reply<()>),
    Deleted(Uuid, Reply<()>),
    Accept {
        suggestion_id: Uuid,
        note_id: Uuid,
        reply: Reply<Resolution>,
    },
    Reject {
        suggestion_id: Uuid,
        note_id: Uuid,
        reply: Reply<Resolution>,
    },
    Status(Reply<EngineStatus>),
    Shutdown(Reply<()>),
}

/// Handle for controlling a running orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    events: EventBus,
    flags: PauseState,
}

impl OrchestratorHandle {
    /// Arm the periodic tick. `false` if already started.
    pub async fn start(&self) -> Result<bool> {
        self.request(Command::Start).await
    }

    /// Disarm the tick and cancel the in-flight request. `false` if already stopped.
    pub async fn stop(&self) -> Result<bool> {
        self.request(Command::Stop).await
    }

    /// Run a selection-and-dispatch pass now.
    pub async fn tick(&self) -> Result<TickOutcome> {
        self.request(Command::Tick).await
    }

    pub async fn pause(&self) -> Result<bool> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<bool> {
        self.request(Command::Resume).await
    }

    /// Activate a note and tick immediately.
    pub async fn activate_note(&self, note_id: Uuid) -> Result<()> {
        self.request(|reply| Command::Activate(note_id, reply)).await
    }

    pub async fn deactivate_note(&self, note_id: Uuid) -> Result<()> {
        self.request(|reply| Command::Deactivate(note_id, reply))
            .await
    }

    pub async fn note_did_edit(&self, note_id: Uuid) -> Result<()> {
        self.request(|reply| Command::DidEdit(note_id, reply)).await
    }

    pub async fn note_deleted(&self, note_id: Uuid) -> Result<()> {
        self.request(|reply| Command::Deleted(note_id, reply)).await
    }

    pub async fn accept_suggestion(&self, suggestion_id: Uuid, note_id: Uuid) -> Result<Resolution> {
        self.request(|reply| Command::Accept {
            suggestion_id,
            note_id,
            reply,
        })
        .await
    }

    pub async fn reject_suggestion(&self, suggestion_id: Uuid, note_id: Uuid) -> Result<Resolution> {
        self.request(|reply| Command::Reject {
            suggestion_id,
            note_id,
            reply,
        })
        .await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        self.request(Command::Status).await
    }

    /// Stop the orchestrator task. Later requests fail.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }

    /// Get a receiver for marination events.
    pub fn events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    pub fn is_paused(&self) -> bool {
        self.flags.is_paused()
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.is_disabled()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| Error::Internal("Orchestrator is not running".into()))?;
        response
            .await
            .map_err(|_| Error::Internal("Orchestrator dropped the request".into()))?
    }
}

/// Spawn the orchestrator onto the current runtime.
pub fn spawn(orchestrator: Orchestrator) -> OrchestratorHandle {
    let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let handle = OrchestratorHandle {
        commands,
        events: orchestrator.events().clone(),
        flags: orchestrator.pause_state().clone(),
    };

    tokio::spawn(run(orchestrator, command_rx));
    handle
}

async fn run(mut orchestrator: Orchestrator, mut commands: mpsc::Receiver<Command>) {
    let mut ticker: Option<Interval> = None;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("All orchestrator handles dropped");
                    break;
                };
                if let Command::Shutdown(reply) = command {
                    orchestrator.stop();
                    let _ = reply.send(Ok(()));
                    break;
                }
                handle_command(&mut orchestrator, &mut ticker, command).await;
            }
            Some(completion) = orchestrator.next_completion() => {
                orchestrator.handle_completion(completion).await;
            }
            _ = next_tick(&mut ticker) => {
                if let Err(e) = orchestrator.tick().await {
                    warn!(error = %e, "Scheduled tick failed");
                }
            }
        }
    }

    orchestrator.stop();
    info!("Orchestrator task exited");
}

async fn handle_command(
    orchestrator: &mut Orchestrator,
    ticker: &mut Option<Interval>,
    command: Command,
) {
    match command {
        Command::Start(reply) => {
            let started = orchestrator.start();
            if started {
                let period = orchestrator.config().tick_interval;
                let mut interval = interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *ticker = Some(interval);
            }
            let _ = reply.send(Ok(started));
        }
        Command::Stop(reply) => {
            *ticker = None;
            let _ = reply.send(Ok(orchestrator.stop()));
        }
        Command::Tick(reply) => {
            let _ = reply.send(orchestrator.tick().await);
        }
        Command::Pause(reply) => {
            let _ = reply.send(Ok(orchestrator.pause()));
        }
        Command::Resume(reply) => {
            let _ = reply.send(Ok(orchestrator.resume()));
        }
        Command::Activate(note_id, reply) => {
            let result = orchestrator.activate_note(note_id).await;
            if result.is_ok() {
                if let Err(e) = orchestrator.tick().await {
                    warn!(note_id = %note_id, error = %e, "Tick after activation failed");
                }
            }
            let _ = reply.send(result);
        }
        Command::Deactivate(note_id, reply) => {
            orchestrator.deactivate_note(note_id);
            let _ = reply.send(Ok(()));
        }
        Command::DidEdit(note_id, reply) => {
            let _ = reply.send(orchestrator.note_did_edit(note_id).await);
        }
        Command::Deleted(note_id, reply) => {
            orchestrator.note_deleted(note_id).await;
            let _ = reply.send(Ok(()));
        }
        Command::Accept {
            suggestion_id,
            note_id,
            reply,
        } => {
            let _ = reply.send(orchestrator.accept_suggestion(suggestion_id, note_id).await);
        }
        Command::Reject {
            suggestion_id,
            note_id,
            reply,
        } => {
            let _ = reply.send(orchestrator.reject_suggestion(suggestion_id, note_id).await);
        }
        Command::Status(reply) => {
            let _ = reply.send(Ok(orchestrator.status()));
        }
        Command::Shutdown(reply) => {
            let _ = reply.send(Ok(()));
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
