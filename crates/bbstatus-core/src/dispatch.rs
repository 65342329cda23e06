//! Replay host: drives listeners from a recorded event stream.
//!
//! The [`Dispatcher`] plays the part of the orchestrator's status
//! broadcaster. It owns the log buffers a real host would keep, so that
//! `log_finished` can hand listeners the full re-readable log, and it
//! delivers every event to all subscribers in subscription order.
//!
//! Event streams are newline-delimited JSON, one [`StatusEvent`] per line.
//! Blank lines and lines starting with `#` are skipped.

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;

use tracing::debug;

use crate::error::{Error, Result};
use crate::events::{BuildKey, LogBuffer, LogSource, StatusEvent, StatusListener};

/// Host identity of one log: build, step name and log name.
type LogKey = (BuildKey, String, String);

/// Counts of events delivered by [`Dispatcher::replay`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Total events dispatched.
    pub events: usize,
    /// Events per kind, keyed by event name.
    pub by_kind: BTreeMap<&'static str, usize>,
    /// Lines skipped (blank or comment).
    pub skipped: usize,
}

impl ReplayStats {
    fn record(&mut self, event: &StatusEvent) {
        self.events += 1;
        *self.by_kind.entry(event.name()).or_insert(0) += 1;
    }
}

/// Status broadcaster delivering host events to subscribed listeners.
#[derive(Default)]
pub struct Dispatcher<'a> {
    listeners: Vec<Box<dyn StatusListener + 'a>>,
    logs: HashMap<LogKey, LogBuffer>,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners are called in subscription order.
    pub fn subscribe(&mut self, listener: impl StatusListener + 'a) {
        self.listeners.push(Box::new(listener));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Logs started but not yet finished.
    pub fn open_logs(&self) -> usize {
        self.logs.len()
    }

    /// Deliver one event to every listener, stopping at the first error.
    pub fn dispatch(&mut self, event: &StatusEvent) -> Result<()> {
        debug!(event = event.name(), "dispatching");

        match event {
            StatusEvent::LogStarted { build, step, log } => {
                self.logs
                    .entry((build.key(), step.name.clone(), log.clone()))
                    .or_default();
            }
            StatusEvent::LogChunk { build, step, log, channel, text } => {
                self.logs
                    .entry((build.key(), step.name.clone(), log.clone()))
                    .or_default()
                    .push(*channel, text.clone());
            }
            _ => {}
        }

        if let StatusEvent::LogFinished { build, step, log, contents } = event {
            let buffer = self
                .logs
                .remove(&(build.key(), step.name.clone(), log.clone()))
                .unwrap_or_default();
            let source: &dyn LogSource = match contents {
                Some(contents) => contents,
                None => &buffer,
            };
            for listener in self.listeners.iter_mut() {
                listener.log_finished(build, step, log, source)?;
            }
            return Ok(());
        }

        for listener in self.listeners.iter_mut() {
            deliver(listener.as_mut(), event)?;
        }
        Ok(())
    }

    /// Dispatch every event read from `reader`, one JSON object per line.
    pub fn replay<R: BufRead>(&mut self, reader: R) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                stats.skipped += 1;
                continue;
            }

            let event: StatusEvent = serde_json::from_str(trimmed).map_err(|e| Error::Event {
                line: index + 1,
                message: e.to_string(),
            })?;
            self.dispatch(&event)?;
            stats.record(&event);
        }

        Ok(stats)
    }
}

/// Call the listener method matching `event`. `LogFinished` is handled by
/// the dispatcher, which owns the log buffers.
fn deliver(listener: &mut dyn StatusListener, event: &StatusEvent) -> Result<()> {
    match event {
        StatusEvent::BuilderAdded { name } => listener.builder_added(name),
        StatusEvent::BuilderChangedState { name, state } => listener.builder_changed_state(name, state),
        StatusEvent::BuilderRemoved { name } => listener.builder_removed(name),
        StatusEvent::BuildStarted { build } => listener.build_started(build),
        StatusEvent::BuildFinished { build, results } => listener.build_finished(build, results),
        StatusEvent::StepStarted { build, step } => listener.step_started(build, step),
        StatusEvent::StepFinished { build, step, results } => listener.step_finished(build, step, results),
        StatusEvent::LogStarted { build, step, log } => listener.log_started(build, step, log),
        StatusEvent::LogChunk { build, step, log, channel, text } => {
            listener.log_chunk(build, step, log, *channel, text)
        }
        StatusEvent::LogFinished { .. } => Ok(()),
    }
}
