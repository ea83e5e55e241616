//! Adapter over the external model runtime.
//!
//! The runtime (an Ollama-compatible server) owns model loading and text
//! generation; this module only speaks its two streaming endpoints. Both
//! respond with newline-delimited JSON, so a byte-level line buffer
//! reassembles records across arbitrary chunk boundaries before decoding.

use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::transcript::ChatMessage;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

// Sampling configuration is fixed for every completion.
pub const TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS: u32 = 512;

pub const SYSTEM_PROMPT: &str = "You are a helpful, friendly AI assistant. \
    You provide concise, accurate, and helpful responses. You are \
    knowledgeable, polite, and aim to assist users with their questions.";

/// Events emitted by spawned engine tasks, applied in production order by
/// the widget's event loop.
#[derive(Debug)]
pub enum EngineEvent {
    LoadProgress(u8),
    LoadComplete,
    LoadFailed(String),
    Delta(String),
    StreamComplete,
    StreamFailed(String),
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct PullLine {
    status: Option<String>,
    completed: Option<u64>,
    total: Option<u64>,
    error: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatLine {
    message: Option<ChatDelta>,
    done: Option<bool>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

/// Reassembles newline-delimited records from a byte stream. Chunks may cut
/// a line, or even a UTF-8 sequence, anywhere.
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

/// Percentage for a pull progress record, in [0,100].
fn pull_percent(completed: Option<u64>, total: Option<u64>) -> Option<u8> {
    match (completed, total) {
        (Some(completed), Some(total)) if total > 0 => {
            Some(((completed * 100) / total).min(100) as u8)
        }
        _ => None,
    }
}

/// Keeps reported progress non-decreasing. The pull endpoint restarts its
/// completed/total counters per layer, so raw percentages jump backwards
/// between layers; those records are dropped.
struct MonotonicProgress {
    last: u8,
}

impl MonotonicProgress {
    fn new() -> Self {
        Self { last: 0 }
    }

    fn advance(&mut self, percent: u8) -> Option<u8> {
        if percent > self.last {
            self.last = percent;
            Some(percent)
        } else {
            None
        }
    }

    /// Pin to 100 on success if the stream never got there on its own.
    fn finish(&mut self) -> Option<u8> {
        if self.last < 100 {
            self.last = 100;
            Some(100)
        } else {
            None
        }
    }
}

#[derive(Clone)]
pub struct EngineClient {
    client: Client,
    base_url: String,
}

impl EngineClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
        }
    }

    pub fn default_local() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }

    /// Load a model, reporting progress as a monotonically non-decreasing
    /// percentage. The pull endpoint streams one record per layer, so raw
    /// percentages can jump backwards between layers; those are dropped.
    pub async fn initialize(&self, model: &str, mut on_progress: impl FnMut(u8)) -> Result<()> {
        let url = format!("{}/api/pull", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&PullRequest { model, stream: true })
            .send()
            .await
            .map_err(unreachable_runtime)?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Model load failed with status: {}",
                response.status()
            ));
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut progress = MonotonicProgress::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for line in lines.push(&chunk) {
                let record: PullLine = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                if let Some(err) = record.error {
                    return Err(anyhow!(err));
                }
                if let Some(percent) = pull_percent(record.completed, record.total) {
                    if let Some(percent) = progress.advance(percent) {
                        on_progress(percent);
                    }
                }
                if record.status.as_deref().is_some_and(|s| s.contains("success")) {
                    if let Some(percent) = progress.finish() {
                        on_progress(percent);
                    }
                    return Ok(());
                }
            }
        }

        // The success record is the protocol terminator; a stream that ends
        // without one did not finish the load.
        Err(anyhow!("Model load ended before the runtime reported success"))
    }

    /// Stream a chat completion. `on_delta` is invoked once per produced
    /// fragment, strictly in production order; the returned string is the
    /// concatenation of all fragments. A failure mid-stream aborts the
    /// sequence with an error and the caller commits nothing.
    pub async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        mut on_delta: impl FnMut(&str),
    ) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let request = ChatRequest {
            model,
            messages,
            stream: true,
            options: ChatOptions {
                temperature: TEMPERATURE,
                num_predict: MAX_TOKENS,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(unreachable_runtime)?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Completion request failed with status: {}",
                response.status()
            ));
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut full = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for line in lines.push(&chunk) {
                let record: ChatLine = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                if let Some(err) = record.error {
                    return Err(anyhow!(err));
                }
                if let Some(content) = record.message.and_then(|m| m.content) {
                    if !content.is_empty() {
                        on_delta(&content);
                        full.push_str(&content);
                    }
                }
                if record.done.unwrap_or(false) {
                    return Ok(full);
                }
            }
        }

        // No done record: the turn never completed, so the fragments seen so
        // far must not be committed as a finished response.
        Err(anyhow!("Response stream ended before completion"))
    }
}

fn unreachable_runtime(e: reqwest::Error) -> anyhow::Error {
    if e.is_connect() {
        anyhow!(
            "Model runtime unreachable. Install Ollama and start it with: ollama serve"
        )
    } else {
        anyhow!(e)
    }
}
