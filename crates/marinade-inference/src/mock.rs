//! Scripted text generator for deterministic tests.
//!
//! Each call to `start()` consumes the next queued [`Script`]; when the
//! queue is empty the fallback script is used. Counters record how the
//! request layer drove each session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use marinade_core::{Error, GeneratorEvent, GeneratorSession, Result, TextGenerator};

/// Behaviour of one generator session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Stream these deltas, then complete the turn.
    Reply(Vec<String>),
    /// Emit a single error event.
    Fail(String),
    /// Fail `start()` with `BackendUnavailable`.
    Unavailable(String),
    /// Never produce an event.
    Hang,
    /// Close the event stream without completing the turn.
    Close,
}

impl Script {
    /// Reply with `value` serialized as one delta.
    pub fn json(value: serde_json::Value) -> Self {
        Script::Reply(vec![value.to_string()])
    }
}

#[derive(Default)]
struct Counters {
    starts: AtomicUsize,
    cancels: AtomicUsize,
    terminates: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

/// Generator that plays back queued scripts.
pub struct ScriptedGenerator {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    counters: Arc<Counters>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ScriptedGenerator {
    /// Falls back to an empty suggestion batch.
    pub fn new() -> Self {
        Self::with_fallback(Script::json(serde_json::json!({ "suggestions": [] })))
    }

    pub fn with_fallback(fallback: Script) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Queue a script for the next unscripted session.
    pub fn push(&self, script: Script) {
        lock(&self.scripts).push_back(script);
    }

    pub fn start_count(&self) -> usize {
        self.counters.starts.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.counters.cancels.load(Ordering::SeqCst)
    }

    pub fn terminate_count(&self) -> usize {
        self.counters.terminates.load(Ordering::SeqCst)
    }

    /// Every prompt sent so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.counters.prompts).clone()
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn start(&self) -> Result<Box<dyn GeneratorSession>> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        let script = lock(&self.scripts)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if let Script::Unavailable(reason) = script {
            return Err(Error::BackendUnavailable(reason));
        }

        Ok(Box::new(ScriptedSession {
            script,
            events: VecDeque::new(),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedSession {
    script: Script,
    events: VecDeque<GeneratorEvent>,
    counters: Arc<Counters>,
}

#[async_trait]
impl GeneratorSession for ScriptedSession {
    async fn send_prompt(&mut self, prompt: &str) -> Result<()> {
        lock(&self.counters.prompts).push(prompt.to_string());
        self.events = match &self.script {
            Script::Reply(deltas) => deltas
                .iter()
                .cloned()
                .map(GeneratorEvent::TextDelta)
                .chain(std::iter::once(GeneratorEvent::TurnComplete))
                .collect(),
            Script::Fail(message) => VecDeque::from([GeneratorEvent::Error(message.clone())]),
            Script::Unavailable(_) | Script::Hang | Script::Close => VecDeque::new(),
        };
        Ok(())
    }

    async fn next_event(&mut self) -> Option<GeneratorEvent> {
        if self.script == Script::Hang {
            std::future::pending::<()>().await;
        }
        self.events.pop_front()
    }

    async fn cancel(&mut self) {
        self.counters.cancels.fetch_add(1, Ordering::SeqCst);
        self.events.clear();
    }

    async fn terminate(&mut self) {
        self.counters.terminates.fetch_add(1, Ordering::SeqCst);
    }
}
