//! Analysis progress reporting.
//!
//! Every stage of the pipeline reports a [`ProgressEvent`] through a
//! [`ProgressReporter`]. The server and the `sgr analyze` command both receive
//! events as [`StreamRecord`]s over a channel ([`ChannelProgress`]); the CLI
//! then renders them with one of the stderr reporters.
//!
//! Reporting can fail: a failed report means the consumer is gone, and the
//! pipeline stops at its next checkpoint.

use serde::{Deserialize, Serialize};
use std::io::Write;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::Disconnected;
use crate::models::AnalysisResult;

/// Progress value meaning "waiting on a rate limit, no forward progress".
pub const RATE_LIMITED: i32 = -1;

/// A single status update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: String,
    /// 0..=100, or [`RATE_LIMITED`].
    pub progress: i32,
}

impl ProgressEvent {
    pub fn new(status: impl Into<String>, progress: i32) -> Self {
        Self {
            status: status.into(),
            progress,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.progress == RATE_LIMITED
    }
}

/// One line of an analysis response stream.
///
/// Zero or more `Progress` records are followed by exactly one `Result` or
/// `Error` record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamRecord {
    Result(AnalysisResult),
    Error {
        status: String,
        progress: i32,
        error: String,
    },
    Progress(ProgressEvent),
}

impl StreamRecord {
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        StreamRecord::Error {
            status: format!("Error: {}", message),
            progress: 100,
            error: message,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamRecord::Progress(_))
    }

    /// Serializes the record as one NDJSON line, newline included.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Receives progress events from the pipeline.
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. `Err` means nobody is listening any more.
    fn report(&self, event: ProgressEvent) -> Result<(), Disconnected>;
}

/// Forwards events into an analysis stream.
#[derive(Clone)]
pub struct ChannelProgress {
    tx: UnboundedSender<StreamRecord>,
}

impl ChannelProgress {
    pub fn new(tx: UnboundedSender<StreamRecord>) -> Self {
        Self { tx }
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, event: ProgressEvent) -> Result<(), Disconnected> {
        self.tx
            .send(StreamRecord::Progress(event))
            .map_err(|_| Disconnected)
    }
}

/// Human-friendly progress on stderr: "[ 42%] Analyzing users 31-60 of 120".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) -> Result<(), Disconnected> {
        let line = if event.is_rate_limited() {
            format!("[wait] {}\n", event.status)
        } else {
            format!("[{:>3}%] {}\n", event.progress, event.status)
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
        Ok(())
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) -> Result<(), Disconnected> {
        if let Ok(line) = serde_json::to_string(&event) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
        Ok(())
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) -> Result<(), Disconnected> {
        Ok(())
    }
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
