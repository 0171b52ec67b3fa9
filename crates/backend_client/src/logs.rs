//! Log normalization and the meeting-log tailer.
//!
//! The backend exposes the board-meeting transcript twice: a server-sent-event
//! stream for live updates and a plain JSON endpoint for catch-up fetches. The
//! tailer prefers the stream and degrades to periodic polling when the stream
//! cannot be opened or ends.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header;
use serde_json::Value;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

use crate::{expect_json, Backend, BackendError};

/// Flatten any of the log payload shapes the backend is known to return into
/// printable lines. Total over arbitrary JSON and idempotent: feeding the
/// output back in (as an array) returns it unchanged.
///
/// - a string is split into its non-blank lines;
/// - array entries pass through, non-strings as compact JSON;
/// - an object is unwrapped through its `logs` field when that field holds a
///   string or array;
/// - everything else normalizes to no lines at all.
pub fn normalize_logs(payload: &Value) -> Vec<String> {
    match payload {
        Value::String(text) => text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(entries) => entries
            .iter()
            .map(|entry| match entry {
                Value::String(line) => line.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::Object(fields) => match fields.get("logs") {
            Some(inner @ (Value::String(_) | Value::Array(_))) => normalize_logs(inner),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    /// One event from the live stream.
    Line(String),
    /// Full transcript snapshot from a poll.
    Snapshot(Vec<String>),
    Status(TailStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailStatus {
    Streaming,
    Polling,
    Unreachable,
}

impl TailStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TailStatus::Streaming => "streaming",
            TailStatus::Polling => "polling",
            TailStatus::Unreachable => "unreachable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TailOptions {
    pub stream_path: String,
    pub poll_path: String,
    pub poll_interval: Duration,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            stream_path: "/meeting/logs/stream".to_string(),
            poll_path: "/meeting/logs".to_string(),
            poll_interval: Duration::from_secs(4),
        }
    }
}

/// Background task tailing the meeting log. Fan-out is over a broadcast
/// channel so any number of console sessions can watch one feed. Dropping the
/// tailer stops the task.
pub struct LogTailer {
    events: broadcast::Sender<TailEvent>,
    task: JoinHandle<()>,
}

impl LogTailer {
    pub fn spawn(backend: Backend, options: TailOptions) -> Self {
        let (events, _) = broadcast::channel(256);
        let sender = events.clone();
        let task = tokio::spawn(async move {
            run(backend, options, sender).await;
        });
        Self { events, task }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TailEvent> {
        self.events.subscribe()
    }
}

impl Drop for LogTailer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(backend: Backend, options: TailOptions, events: broadcast::Sender<TailEvent>) {
    match stream_lines(&backend, &options.stream_path, &events).await {
        Ok(()) => info!("meeting log stream ended; retrying with periodic fetch"),
        Err(err) => warn!(%err, "meeting log stream unavailable; retrying with periodic fetch"),
    }
    poll_lines(&backend, &options, &events).await;
}

async fn stream_lines(
    backend: &Backend,
    path: &str,
    events: &broadcast::Sender<TailEvent>,
) -> Result<(), BackendError> {
    let response = backend
        .http
        .get(backend.url(path))
        .header(header::ACCEPT, "text/event-stream")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::Status {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("stream rejected")
                .to_string(),
        });
    }

    let _ = events.send(TailEvent::Status(TailStatus::Streaming));

    let mut parser = SseParser::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        for event in parser.push(&chunk?) {
            let _ = events.send(TailEvent::Line(event));
        }
    }
    for event in parser.finish() {
        let _ = events.send(TailEvent::Line(event));
    }
    Ok(())
}

async fn poll_lines(backend: &Backend, options: &TailOptions, events: &broadcast::Sender<TailEvent>) {
    let _ = events.send(TailEvent::Status(TailStatus::Polling));

    let mut reachable = true;
    let mut ticker = tokio::time::interval(options.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match fetch_snapshot(backend, &options.poll_path).await {
            Ok(lines) => {
                if !reachable {
                    reachable = true;
                    let _ = events.send(TailEvent::Status(TailStatus::Polling));
                }
                let _ = events.send(TailEvent::Snapshot(lines));
            }
            Err(err) => {
                warn!(%err, "meeting log poll failed");
                if reachable {
                    reachable = false;
                    let _ = events.send(TailEvent::Status(TailStatus::Unreachable));
                }
            }
        }
    }
}

async fn fetch_snapshot(backend: &Backend, path: &str) -> Result<Vec<String>, BackendError> {
    let response = backend
        .http
        .get(backend.url(path))
        .header(header::ACCEPT, "application/json")
        .send()
        .await?;
    let payload: Value = expect_json(response).await?;
    Ok(normalize_logs(&payload))
}

/// Incremental parser for a `text/event-stream` body. Chunks split anywhere,
/// including inside a line; event payloads are the `data:` fields, joined with
/// newlines when an event carries several.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseParser {
    /// Feed one chunk, get every event the chunk completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut completed = Vec::new();
        while let Some(index) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=index).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.take_line(line.trim_end_matches(['\n', '\r'])) {
                completed.push(event);
            }
        }
        completed
    }

    /// Flush whatever the stream left behind when it closed.
    pub fn finish(&mut self) -> Vec<String> {
        let remainder = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&remainder);
        let line = line.trim_end_matches('\r');
        if !line.is_empty() {
            self.consume_field(line);
        }

        let mut completed = Vec::new();
        if let Some(event) = self.flush_event() {
            completed.push(event);
        }
        completed
    }

    fn take_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.flush_event();
        }
        self.consume_field(line);
        None
    }

    fn consume_field(&mut self, line: &str) {
        // Only `data:` fields carry transcript text; comments and the other
        // SSE fields (event:, id:, retry:) are skipped.
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            self.data_lines.push(data.to_string());
        }
    }

    fn flush_event(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data_lines).join("\n"))
    }
}

#[cfg(test)]
#[path = "tests/logs_tests.rs"]
mod tests;
