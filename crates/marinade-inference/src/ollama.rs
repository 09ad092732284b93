//! Ollama streaming generator over `/api/chat`.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OLLAMA_BASE` | `http://127.0.0.1:11434` | Ollama endpoint |
//! | `OLLAMA_GEN_MODEL` | `gpt-oss:20b` | Generation model |
//! | `OLLAMA_JSON_FORMAT` | `true` | Ask Ollama to enforce JSON output |
//! | `OLLAMA_THINK` | `false` | Thinking mode: `true`, `false`, or `default` to omit the flag |

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use marinade_core::defaults::{GEN_MODEL, OLLAMA_URL, PROBE_TIMEOUT_SECS};
use marinade_core::{Error, GeneratorEvent, GeneratorSession, Result, TextGenerator};

/// Buffered events between the HTTP stream and the session reader.
const EVENT_BUFFER: usize = 64;

/// Text generator backed by a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    json_format: bool,
    think: Option<bool>,
    probe_timeout: Duration,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        info!(url = %base_url, model = %model, "Initializing Ollama generator");

        Self {
            client: Client::new(),
            base_url,
            model,
            json_format: true,
            think: Some(false),
            probe_timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_BASE").unwrap_or_else(|_| OLLAMA_URL.to_string());
        let model = std::env::var("OLLAMA_GEN_MODEL").unwrap_or_else(|_| GEN_MODEL.to_string());
        let json_format = std::env::var("OLLAMA_JSON_FORMAT")
            .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no"))
            .unwrap_or(true);
        let think = match std::env::var("OLLAMA_THINK") {
            Ok(v) => parse_think(&v),
            Err(_) => Some(false),
        };

        Self::new(base_url, model)
            .with_json_format(json_format)
            .with_think(think)
    }

    pub fn with_json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Thinking flag sent with each chat request. `None` leaves the choice
    /// to the model.
    pub fn with_think(mut self, think: Option<bool>) -> Self {
        self.think = think;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn probe(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| {
                Error::BackendUnavailable(format!("Ollama at {} unreachable: {}", self.base_url, e))
            })?;

        if !response.status().is_success() {
            return Err(Error::BackendUnavailable(format!(
                "Ollama at {} returned {}",
                self.base_url,
                response.status()
            )));
        }
        Ok(())
    }
}

impl Default for OllamaGenerator {
    fn default() -> Self {
        Self::new(OLLAMA_URL, GEN_MODEL)
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    #[instrument(skip(self), fields(subsystem = "inference", component = "ollama", op = "start", model = %self.model))]
    async fn start(&self) -> Result<Box<dyn GeneratorSession>> {
        self.probe().await?;
        debug!("Ollama reachable, session started");

        Ok(Box::new(OllamaSession {
            client: self.client.clone(),
            chat_url: format!("{}/api/chat", self.base_url),
            model: self.model.clone(),
            json_format: self.json_format,
            think: self.think,
            events: None,
            stream_task: None,
        }))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// One chat turn streamed from Ollama.
pub struct OllamaSession {
    client: Client,
    chat_url: String,
    model: String,
    json_format: bool,
    think: Option<bool>,
    events: Option<mpsc::Receiver<GeneratorEvent>>,
    stream_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl GeneratorSession for OllamaSession {
    #[instrument(skip(self, prompt), fields(subsystem = "inference", component = "ollama", op = "send_prompt", model = %self.model, prompt_len = prompt.len()))]
    async fn send_prompt(&mut self, prompt: &str) -> Result<()> {
        if self.stream_task.is_some() {
            return Err(Error::InvalidInput(
                "prompt already sent on this session".to_string(),
            ));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: true,
            format: self.json_format.then(|| serde_json::json!("json")),
            think: self.think,
        };

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let request = self.client.post(&self.chat_url).json(&request);
        self.events = Some(rx);
        self.stream_task = Some(tokio::spawn(stream_chat(request, tx)));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<GeneratorEvent> {
        self.events.as_mut()?.recv().await
    }

    async fn cancel(&mut self) {
        if let Some(task) = self.stream_task.as_ref() {
            task.abort();
        }
    }

    async fn terminate(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        self.events = None;
    }
}

impl Drop for OllamaSession {
    fn drop(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
    }
}

async fn stream_chat(request: reqwest::RequestBuilder, tx: mpsc::Sender<GeneratorEvent>) {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            let message = if e.is_connect() {
                format!("backend unavailable: {e}")
            } else {
                format!("Request failed: {e}")
            };
            let _ = tx.send(GeneratorEvent::Error(message)).await;
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let _ = tx
            .send(GeneratorEvent::Error(format!(
                "Ollama returned {status}: {body}"
            )))
            .await;
        return;
    }

    let mut stream = response.bytes_stream();
    let mut lines = LineBuffer::default();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                for line in lines.push(&bytes) {
                    if !forward_line(&line, &tx).await {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Ollama stream interrupted");
                let _ = tx
                    .send(GeneratorEvent::Error(format!("Stream error: {e}")))
                    .await;
                return;
            }
        }
    }

    if let Some(line) = lines.finish() {
        forward_line(&line, &tx).await;
    }
}

/// Forward the events of one line. `false` once the turn is over or the
/// reader has gone away.
async fn forward_line(line: &str, tx: &mpsc::Sender<GeneratorEvent>) -> bool {
    for event in parse_stream_line(line) {
        let finished = !matches!(event, GeneratorEvent::TextDelta(_));
        if tx.send(event).await.is_err() || finished {
            return false;
        }
    }
    true
}

/// Splits a byte stream into complete newline-terminated lines.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }

    fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Events carried by one NDJSON line of a streaming chat response.
fn parse_stream_line(line: &str) -> Vec<GeneratorEvent> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let chunk: ChatStreamChunk = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            return vec![GeneratorEvent::Error(format!(
                "Failed to parse stream chunk: {e}"
            ))]
        }
    };

    if let Some(error) = chunk.error {
        return vec![GeneratorEvent::Error(error)];
    }

    let mut events = Vec::with_capacity(2);
    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            events.push(GeneratorEvent::TextDelta(message.content));
        }
    }
    if chunk.done {
        events.push(GeneratorEvent::TurnComplete);
    }
    events
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

/// `OLLAMA_THINK` value: `None` for "default", otherwise a boolean.
fn parse_think(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "default" | "" => None,
        "true" | "1" | "yes" => Some(true),
        _ => Some(false),
    }
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Ollama format enforcement. `"json"` guarantees valid JSON output.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    /// Thinking mode for models that support it. Omitted when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

/// One line of a streaming `/api/chat` response.
#[derive(Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}
