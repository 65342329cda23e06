//! Host status events
//!
//! The orchestrator announces build lifecycle changes through a fixed set of
//! callbacks. [`StatusListener`] has one method per callback; a listener is
//! registered with the host (or the replay [`Dispatcher`](crate::dispatch::Dispatcher))
//! and receives every event in the order the host emits it.
//!
//! # Event flow for one build
//!
//! ```text
//! builder_added ─▶ builder_changed_state ─▶ build_started
//!     ─▶ step_started ─▶ log_started ─▶ log_chunk* ─▶ log_finished ─▶ step_finished
//!     ─▶ ... ─▶ build_finished
//! ```
//!
//! Every method returns `Result<()>`: a failed write is handed back to the
//! host's dispatch loop unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Channel, ResultCode};

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of a build as the host knows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildKey {
    pub builder: String,
    pub number: u64,
}

/// A running or finished build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Name of the builder running the build.
    pub builder: String,
    /// Sequential build number within the builder.
    pub number: u64,
    /// Workers attached to the builder.
    #[serde(default)]
    pub workers: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildInfo {
    pub fn key(&self) -> BuildKey {
        BuildKey {
            builder: self.builder.clone(),
            number: self.number,
        }
    }
}

/// A step within a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub name: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Outcome of a finished step: result code plus descriptive strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResults {
    pub result: i32,
    #[serde(default)]
    pub text: Vec<String>,
}

impl StepResults {
    pub fn new(result: ResultCode) -> Self {
        Self {
            result: result.code(),
            text: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == ResultCode::SUCCESS
    }
}

/// Outcome of a finished build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResults {
    pub result: i32,
}

/// Read access to a log's accumulated content.
pub trait LogSource {
    /// Full text written to `channel` so far.
    fn read_channel(&self, channel: Channel) -> String;
}

/// Complete log content, one string per channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogContents {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub headers: String,
}

impl LogSource for LogContents {
    fn read_channel(&self, channel: Channel) -> String {
        match channel {
            Channel::Stdout => self.stdout.clone(),
            Channel::Stderr => self.stderr.clone(),
            Channel::Header => self.headers.clone(),
        }
    }
}

/// Host-side log buffer: chunks in arrival order, re-readable per channel.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    chunks: Vec<(Channel, String)>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: Channel, text: impl Into<String>) {
        self.chunks.push((channel, text.into()));
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl LogSource for LogBuffer {
    fn read_channel(&self, channel: Channel) -> String {
        self.chunks
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, text)| text.as_str())
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listener
// ─────────────────────────────────────────────────────────────────────────────

/// Receiver of host status events.
///
/// All methods default to doing nothing, so listeners only implement the
/// events they care about.
pub trait StatusListener {
    fn builder_added(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn builder_changed_state(&mut self, _name: &str, _state: &str) -> Result<()> {
        Ok(())
    }

    fn builder_removed(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn build_started(&mut self, _build: &BuildInfo) -> Result<()> {
        Ok(())
    }

    fn build_finished(&mut self, _build: &BuildInfo, _results: &BuildResults) -> Result<()> {
        Ok(())
    }

    fn step_started(&mut self, _build: &BuildInfo, _step: &StepInfo) -> Result<()> {
        Ok(())
    }

    fn step_finished(
        &mut self,
        _build: &BuildInfo,
        _step: &StepInfo,
        _results: &StepResults,
    ) -> Result<()> {
        Ok(())
    }

    fn log_started(&mut self, _build: &BuildInfo, _step: &StepInfo, _log: &str) -> Result<()> {
        Ok(())
    }

    fn log_chunk(
        &mut self,
        _build: &BuildInfo,
        _step: &StepInfo,
        _log: &str,
        _channel: Channel,
        _text: &str,
    ) -> Result<()> {
        Ok(())
    }

    fn log_finished(
        &mut self,
        _build: &BuildInfo,
        _step: &StepInfo,
        _log: &str,
        _contents: &dyn LogSource,
    ) -> Result<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Serialized events
// ─────────────────────────────────────────────────────────────────────────────

/// One host event, as carried on a JSON-lines stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    BuilderAdded {
        name: String,
    },
    BuilderChangedState {
        name: String,
        state: String,
    },
    BuilderRemoved {
        name: String,
    },
    BuildStarted {
        build: BuildInfo,
    },
    BuildFinished {
        build: BuildInfo,
        results: BuildResults,
    },
    StepStarted {
        build: BuildInfo,
        step: StepInfo,
    },
    StepFinished {
        build: BuildInfo,
        step: StepInfo,
        results: StepResults,
    },
    LogStarted {
        build: BuildInfo,
        step: StepInfo,
        #[serde(default = "default_log_name")]
        log: String,
    },
    LogChunk {
        build: BuildInfo,
        step: StepInfo,
        #[serde(default = "default_log_name")]
        log: String,
        channel: Channel,
        text: String,
    },
    LogFinished {
        build: BuildInfo,
        step: StepInfo,
        #[serde(default = "default_log_name")]
        log: String,
        /// Authoritative final content; when absent the host's own buffer is re-read.
        #[serde(default)]
        contents: Option<LogContents>,
    },
}

fn default_log_name() -> String {
    "stdio".to_string()
}

impl StatusEvent {
    /// snake_case event name, as used in the `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            StatusEvent::BuilderAdded { .. } => "builder_added",
            StatusEvent::BuilderChangedState { .. } => "builder_changed_state",
            StatusEvent::BuilderRemoved { .. } => "builder_removed",
            StatusEvent::BuildStarted { .. } => "build_started",
            StatusEvent::BuildFinished { .. } => "build_finished",
            StatusEvent::StepStarted { .. } => "step_started",
            StatusEvent::StepFinished { .. } => "step_finished",
            StatusEvent::LogStarted { .. } => "log_started",
            StatusEvent::LogChunk { .. } => "log_chunk",
            StatusEvent::LogFinished { .. } => "log_finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_buffer_reads_per_channel_in_order() {
        let mut log = LogBuffer::new();
        log.push(Channel::Stdout, "a");
        log.push(Channel::Stderr, "oops");
        log.push(Channel::Stdout, "b");
        log.push(Channel::Header, "$ make\n");
        log.push(Channel::Stdout, "c");

        assert_eq!(log.len(), 5);
        assert_eq!(log.read_channel(Channel::Stdout), "abc");
        assert_eq!(log.read_channel(Channel::Stderr), "oops");
        assert_eq!(log.read_channel(Channel::Header), "$ make\n");
    }

    #[test]
    fn test_step_results_success() {
        assert!(StepResults::new(ResultCode::Success).is_success());
        assert!(!StepResults::new(ResultCode::Warnings).is_success());
        assert!(!StepResults { result: 99, text: vec![] }.is_success());
    }

    #[test]
    fn test_parse_event_line() {
        let line = r#"{"event":"log_chunk","build":{"builder":"linux-x64","number":42,"started_at":"2024-01-01T00:00:00Z"},"step":{"name":"compile","started_at":"2024-01-01T00:00:01Z"},"channel":"stdout","text":"a"}"#;
        let event: StatusEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.name(), "log_chunk");

        match event {
            StatusEvent::LogChunk { build, step, log, channel, text } => {
                assert_eq!(build.key(), BuildKey { builder: "linux-x64".into(), number: 42 });
                assert!(build.workers.is_empty());
                assert_eq!(step.name, "compile");
                assert_eq!(log, "stdio");
                assert_eq!(channel, Channel::Stdout);
                assert_eq!(text, "a");
            }
            other => panic!("expected LogChunk, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        let result = serde_json::from_str::<StatusEvent>(r#"{"event":"build_exploded"}"#);
        assert!(result.is_err());
    }

    struct Silent;
    impl StatusListener for Silent {}

    #[test]
    fn test_listener_defaults_are_noops() {
        let mut listener = Silent;
        assert!(listener.builder_added("linux-x64").is_ok());
        assert!(listener.builder_removed("linux-x64").is_ok());
    }
}
