//! Single-use generation request.
//!
//! A [`GenerationRequest`] starts a generator session, waits a short grace
//! period, sends the prompt, and accumulates streamed deltas until the turn
//! completes, the generator reports an error, or the deadline fires. The
//! first of those resolves the request; the result callback runs exactly
//! once, and never after [`RequestHandle::cancel`].
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MARINADE_GENERATOR_GRACE_MS` | `500` | Delay between session start and prompt |

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use marinade_core::defaults::GENERATOR_GRACE_MS;
use marinade_core::{Error, GeneratorEvent, GeneratorSession, Result, TextGenerator};

use crate::structured::extract_structured;

/// Lifecycle of one request: `Idle → Started → terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Started,
    Completed,
    TimedOut,
    Errored,
    Canceled,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestState::Idle | RequestState::Started)
    }
}

/// Successful result of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    /// Accumulated text of the turn.
    pub text: String,
    /// Parsed object when a structured result was requested.
    pub structured: Option<JsonValue>,
}

/// What the result callback receives.
pub type RequestOutcome = Result<GenerationOutput>;

type ResultCallback = Box<dyn FnOnce(RequestOutcome) + Send>;

struct Slot {
    state: RequestState,
    callback: Option<ResultCallback>,
}

/// State and callback shared between the handle and the driving task.
///
/// Whoever takes the callback out of the slot first decides the request's
/// fate: the task by resolving, the handle by canceling.
struct Shared {
    slot: Mutex<Slot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn state(&self) -> RequestState {
        self.lock().state
    }

    fn resolve(&self, state: RequestState, outcome: RequestOutcome) {
        let callback = {
            let mut slot = self.lock();
            match slot.callback.take() {
                Some(callback) => {
                    slot.state = state;
                    callback
                }
                None => return,
            }
        };
        callback(outcome);
    }

    fn cancel(&self) -> bool {
        let mut slot = self.lock();
        if slot.state.is_terminal() {
            return false;
        }
        slot.state = RequestState::Canceled;
        slot.callback = None;
        true
    }
}

/// Builder for a single generation request.
pub struct GenerationRequest {
    generator: Arc<dyn TextGenerator>,
    grace: Duration,
}

impl GenerationRequest {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            grace: Duration::from_millis(GENERATOR_GRACE_MS),
        }
    }

    /// Grace delay from `MARINADE_GENERATOR_GRACE_MS`, falling back to the default.
    pub fn from_env(generator: Arc<dyn TextGenerator>) -> Self {
        let grace_ms = std::env::var("MARINADE_GENERATOR_GRACE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(GENERATOR_GRACE_MS);
        Self::new(generator).with_grace(Duration::from_millis(grace_ms))
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Start the request. Consumes the builder; requests are not reusable.
    ///
    /// Must be called from within a Tokio runtime. `on_result` runs on the
    /// driving task, exactly once unless the request is canceled first.
    pub fn send<F>(
        self,
        prompt: String,
        expect_structured: bool,
        timeout: Duration,
        on_result: F,
    ) -> RequestHandle
    where
        F: FnOnce(RequestOutcome) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot {
                state: RequestState::Started,
                callback: Some(Box::new(on_result)),
            }),
        });
        let (cancel_tx, cancel_rx) = oneshot::channel();

        tokio::spawn(run_request(
            self.generator,
            prompt,
            expect_structured,
            timeout,
            self.grace,
            Arc::clone(&shared),
            cancel_rx,
        ));

        RequestHandle {
            shared,
            cancel_tx: Some(cancel_tx),
        }
    }
}

/// Handle to an in-flight request. Dropping it does not cancel the request.
pub struct RequestHandle {
    shared: Arc<Shared>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl RequestHandle {
    pub fn state(&self) -> RequestState {
        self.shared.state()
    }

    pub fn is_resolved(&self) -> bool {
        self.state().is_terminal()
    }

    /// Cancel the request and tear down its generator session.
    ///
    /// Returns `false` when the request had already resolved, in which case
    /// nothing happens.
    pub fn cancel(&mut self) -> bool {
        let canceled = self.shared.cancel();
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        canceled
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("state", &self.state())
            .finish()
    }
}

async fn run_request(
    generator: Arc<dyn TextGenerator>,
    prompt: String,
    expect_structured: bool,
    timeout: Duration,
    grace: Duration,
    shared: Arc<Shared>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let started = Instant::now();
    let mut session: Option<Box<dyn GeneratorSession>> = None;

    let resolved = tokio::select! {
        biased;
        Ok(()) = &mut cancel_rx => None,
        _ = tokio::time::sleep(timeout) => {
            Some((RequestState::TimedOut, Err(Error::Timeout(timeout.as_secs()))))
        }
        result = drive_turn(generator.as_ref(), &mut session, &prompt, grace) => {
            Some(finish_turn(result, expect_structured))
        }
    };

    if let Some(session) = session.as_mut() {
        if !matches!(resolved, Some((RequestState::Completed, _))) {
            session.cancel().await;
        }
        session.terminate().await;
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    match resolved {
        None => debug!(
            generator = generator.name(),
            duration_ms, "Generation request canceled"
        ),
        Some((state, outcome)) => {
            match &outcome {
                Ok(output) => debug!(
                    generator = generator.name(),
                    response_len = output.text.len(),
                    duration_ms,
                    "Generation request completed"
                ),
                Err(e) => warn!(
                    generator = generator.name(),
                    state = ?state,
                    error = %e,
                    duration_ms,
                    "Generation request failed"
                ),
            }
            shared.resolve(state, outcome);
        }
    }
}

async fn drive_turn(
    generator: &dyn TextGenerator,
    session: &mut Option<Box<dyn GeneratorSession>>,
    prompt: &str,
    grace: Duration,
) -> Result<String> {
    let active = session.insert(generator.start().await?);

    if !grace.is_zero() {
        tokio::time::sleep(grace).await;
    }
    active.send_prompt(prompt).await?;

    let mut text = String::new();
    loop {
        match active.next_event().await {
            Some(GeneratorEvent::TextDelta(delta)) => text.push_str(&delta),
            Some(GeneratorEvent::TurnComplete) => return Ok(text),
            Some(GeneratorEvent::Error(message)) => return Err(Error::Inference(message)),
            None => {
                return Err(Error::Inference(
                    "generator stream closed before the turn completed".to_string(),
                ))
            }
        }
    }
}

fn finish_turn(
    result: Result<String>,
    expect_structured: bool,
) -> (RequestState, RequestOutcome) {
    let text = match result {
        Ok(text) => text,
        Err(e) => return (RequestState::Errored, Err(e)),
    };

    if !expect_structured {
        return (
            RequestState::Completed,
            Ok(GenerationOutput {
                text,
                structured: None,
            }),
        );
    }

    match extract_structured(&text) {
        Ok(value) => (
            RequestState::Completed,
            Ok(GenerationOutput {
                text,
                structured: Some(value),
            }),
        ),
        Err(e) => (RequestState::Errored, Err(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Script, ScriptedGenerator};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn collector() -> (
        impl FnOnce(RequestOutcome) + Send + 'static,
        mpsc::UnboundedReceiver<RequestOutcome>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |outcome| {
                let _ = tx.send(outcome);
            },
            rx,
        )
    }

    fn request(generator: &Arc<ScriptedGenerator>) -> GenerationRequest {
        GenerationRequest::new(generator.clone()).with_grace(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_completed_structured_result() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push(Script::Reply(vec![
            "```json\n{\"suggestions\":".to_string(),
            " []}\n```".to_string(),
        ]));
        let (on_result, mut rx) = collector();

        let handle = request(&generator).send(
            "prompt".to_string(),
            true,
            Duration::from_secs(5),
            on_result,
        );
        let output = rx.recv().await.unwrap().unwrap();

        assert!(output.structured.unwrap()["suggestions"].is_array());
        assert_eq!(handle.state(), RequestState::Completed);
        assert_eq!(generator.prompts(), vec!["prompt".to_string()]);
    }

    #[tokio::test]
    async fn test_plain_text_result() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push(Script::Reply(vec!["hello ".to_string(), "world".to_string()]));
        let (on_result, mut rx) = collector();

        request(&generator).send("p".to_string(), false, Duration::from_secs(5), on_result);
        let output = rx.recv().await.unwrap().unwrap();

        assert_eq!(output.text, "hello world");
        assert!(output.structured.is_none());
    }

    #[tokio::test]
    async fn test_malformed_structured_result_is_error() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push(Script::Reply(vec!["not json at all".to_string()]));
        let (on_result, mut rx) = collector();

        let handle =
            request(&generator).send("p".to_string(), true, Duration::from_secs(5), on_result);
        let err = rx.recv().await.unwrap().unwrap_err();

        assert!(matches!(err, Error::MalformedResponse(ref m) if m.contains("not json at all")));
        assert_eq!(handle.state(), RequestState::Errored);
    }

    #[tokio::test]
    async fn test_generator_error_event() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push(Script::Fail("model crashed".to_string()));
        let (on_result, mut rx) = collector();

        request(&generator).send("p".to_string(), true, Duration::from_secs(5), on_result);
        let err = rx.recv().await.unwrap().unwrap_err();

        assert!(matches!(err, Error::Inference(ref m) if m == "model crashed"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push(Script::Unavailable("executable not found".to_string()));
        let (on_result, mut rx) = collector();

        let handle =
            request(&generator).send("p".to_string(), true, Duration::from_secs(5), on_result);
        let err = rx.recv().await.unwrap().unwrap_err();

        assert!(err.is_backend_unavailable());
        assert_eq!(handle.state(), RequestState::Errored);
        assert_eq!(generator.terminate_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_with_timeout_error() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push(Script::Hang);
        let (on_result, mut rx) = collector();

        let handle =
            request(&generator).send("p".to_string(), true, Duration::from_secs(120), on_result);
        let err = rx.recv().await.unwrap().unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Generation timed out after 120s");
        assert_eq!(handle.state(), RequestState::TimedOut);
        assert_eq!(generator.cancel_count(), 1);
        assert_eq!(generator.terminate_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_callback() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push(Script::Hang);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut handle = request(&generator).send(
            "p".to_string(),
            true,
            Duration::from_secs(120),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.cancel());
        assert_eq!(handle.state(), RequestState::Canceled);

        // Well past the deadline: the timeout must not fire a callback either.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.terminate_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_resolution_is_noop() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push(Script::Reply(vec!["{}".to_string()]));
        let (on_result, mut rx) = collector();

        let mut handle =
            request(&generator).send("p".to_string(), true, Duration::from_secs(5), on_result);
        rx.recv().await.unwrap().unwrap();

        assert!(!handle.cancel());
        assert_eq!(handle.state(), RequestState::Completed);
    }

    #[tokio::test]
    async fn test_stream_closed_early_is_error() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push(Script::Close);
        let (on_result, mut rx) = collector();

        request(&generator).send("p".to_string(), false, Duration::from_secs(5), on_result);
        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_delay_precedes_prompt() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push(Script::Reply(vec!["ok".to_string()]));
        let (on_result, mut rx) = collector();

        GenerationRequest::new(generator.clone())
            .with_grace(Duration::from_millis(500))
            .send("p".to_string(), false, Duration::from_secs(5), on_result);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(generator.start_count(), 1);
        assert!(generator.prompts().is_empty());

        rx.recv().await.unwrap().unwrap();
        assert_eq!(generator.prompts().len(), 1);
    }
}
