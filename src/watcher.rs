//! Container log watching.
//!
//! Each started container gets one detached task that follows its combined
//! stdout/stderr stream from the beginning and writes every line, prefixed
//! with the right-aligned hostname, to a shared sink.
//!
//! Watchers are fire-and-forget. The lifecycle manager never awaits them;
//! a watcher lives at most until its container stops or the process exits,
//! and its output may be truncated on shutdown.

use std::io::Write;
use std::sync::{Arc, Mutex};

use colored::{Color, Colorize};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::runtime::{LogOptions, RuntimeGateway};
use crate::service::ContainerHandle;

/// Minimum column width of the hostname prefix.
pub const NAME_WIDTH: usize = 10;

/// Prefix colors, one picked per watcher.
pub const PALETTE: [Color; 5] = [
    Color::Red,
    Color::Green,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
];

/// Right-aligns `name` to [`NAME_WIDTH`] columns. Longer names are kept whole.
pub fn pad_name(name: &str) -> String {
    format!("{:>width$}", name, width = NAME_WIDTH)
}

/// Picks a prefix color from [`PALETTE`].
pub fn random_color() -> Color {
    PALETTE
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(Color::Red)
}

/// Destination for prefixed log lines.
pub trait LogSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes lines to the process stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        // stdout may be closed during shutdown
        let _ = writeln!(out, "{line}");
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the collected lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

/// Reassembles lines from arbitrarily split log chunks.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    /// Appends a chunk and returns every line it completed.
    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Returns the trailing partial line, if any.
    fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending)
        }
    }
}

/// Follows the logs of one container.
pub struct LogWatcher {
    hostname: String,
    color: Color,
}

impl LogWatcher {
    pub fn new(hostname: impl Into<String>, color: Color) -> Self {
        Self {
            hostname: hostname.into(),
            color,
        }
    }

    /// Spawns a detached watcher for `handle` with a randomly chosen color.
    ///
    /// The returned `JoinHandle` may be dropped; the task is not cancelled.
    pub fn spawn(
        gateway: Arc<dyn RuntimeGateway>,
        handle: &ContainerHandle,
        sink: Arc<dyn LogSink>,
    ) -> JoinHandle<()> {
        let watcher = Self::new(handle.hostname(), random_color());
        let id = handle.id().to_string();
        tokio::spawn(async move { watcher.watch(gateway.as_ref(), &id, sink.as_ref()).await })
    }

    /// Formats one output line.
    pub fn format_line(&self, line: &str) -> String {
        format!(
            "{} | {}",
            pad_name(&self.hostname).as_str().color(self.color).bold(),
            line
        )
    }

    /// Streams logs until the stream ends or fails. Never panics on read errors.
    pub async fn watch(&self, gateway: &dyn RuntimeGateway, id: &str, sink: &dyn LogSink) {
        let mut stream = match gateway.stream_logs(id, LogOptions::default()).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(hostname = %self.hostname, "Unable to open log stream: {}", e);
                return;
            }
        };

        let mut buffer = LineBuffer::default();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) => {
                    for line in buffer.push(&text) {
                        sink.write_line(&self.format_line(&line));
                    }
                }
                Err(e) => {
                    warn!(hostname = %self.hostname, "Log stream interrupted: {}", e);
                    break;
                }
            }
        }

        if let Some(rest) = buffer.finish() {
            sink.write_line(&self.format_line(&rest));
        }
        debug!(hostname = %self.hostname, "Log stream closed");
    }
}
