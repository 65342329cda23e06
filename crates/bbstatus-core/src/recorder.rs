//! Event recorder: turns host status events into documents.
//!
//! The recorder keeps the live build and step documents in memory, keyed by
//! the host's own identifiers, and writes the whole document back after every
//! change. Steps reference their build by the id generated at build start.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::events::{BuildInfo, BuildKey, BuildResults, LogSource, StatusListener, StepInfo, StepResults};
use crate::store::{self, DocumentStore};
use crate::types::{BuildRecord, BuilderRecord, Channel, StepRecord, STATUS_OFFLINE};

/// Host identity of a step: its build plus the step name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StepKey {
    build: BuildKey,
    name: String,
}

impl StepKey {
    fn new(build: &BuildInfo, step: &StepInfo) -> Self {
        Self {
            build: build.key(),
            name: step.name.clone(),
        }
    }
}

/// Persists build lifecycle events into a [`DocumentStore`].
pub struct EventRecorder {
    store: Arc<dyn DocumentStore>,
    master_id: Option<String>,
    watched: HashSet<String>,
    builds: HashMap<BuildKey, BuildRecord>,
    steps: HashMap<StepKey, StepRecord>,
}

impl EventRecorder {
    /// Create a recorder on an already prepared store.
    pub fn new(store: Arc<dyn DocumentStore>, master_id: Option<String>) -> Self {
        Self {
            store,
            master_id,
            watched: HashSet::new(),
            builds: HashMap::new(),
            steps: HashMap::new(),
        }
    }

    /// Open the configured store, authenticate and make sure indexes exist.
    ///
    /// Authentication failure aborts with [`Error::Authentication`].
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let store = store::open(config)?;
        Self::setup(store, config)
    }

    /// Authenticate and bootstrap indexes on `store`.
    pub fn setup(store: Arc<dyn DocumentStore>, config: &StoreConfig) -> Result<Self> {
        if let Err(e) = store.authenticate() {
            if e.is_authentication() {
                tracing::error!(database = %config.database, "not connected to database, authentication failed");
            }
            return Err(e);
        }
        info!(backend = %store.backend(), database = %config.database, "connected to database");

        let created = store.ensure_indexes()?;
        info!(created, "indexes checked");

        Ok(Self::new(store, config.master_id.clone()))
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn master_id(&self) -> Option<&str> {
        self.master_id.as_deref()
    }

    /// Builders added and not yet removed, sorted by name.
    pub fn watched_builders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.watched.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// In-memory copy of a running build.
    pub fn build(&self, build: &BuildInfo) -> Option<&BuildRecord> {
        self.builds.get(&build.key())
    }

    /// In-memory copy of a step of a running build.
    pub fn step(&self, build: &BuildInfo, step: &StepInfo) -> Option<&StepRecord> {
        self.steps.get(&StepKey::new(build, step))
    }

    /// Number of builds currently tracked.
    pub fn running_builds(&self) -> usize {
        self.builds.len()
    }

    fn set_builder_status(&self, name: &str, status: &str) -> Result<()> {
        let mut builder = self
            .store
            .find_builder(name, self.master_id())?
            .unwrap_or_else(|| BuilderRecord::new(name, self.master_id.clone()));
        builder.status = status.to_string();
        self.store.save_builder(&builder)
    }

    fn build_mut(&mut self, build: &BuildInfo) -> Result<&mut BuildRecord> {
        self.builds
            .get_mut(&build.key())
            .ok_or_else(|| Error::UnknownBuild {
                builder: build.builder.clone(),
                number: build.number,
            })
    }

    fn step_mut(&mut self, build: &BuildInfo, step: &StepInfo) -> Result<&mut StepRecord> {
        self.steps
            .get_mut(&StepKey::new(build, step))
            .ok_or_else(|| Error::UnknownStep {
                builder: build.builder.clone(),
                number: build.number,
                step: step.name.clone(),
            })
    }
}

impl StatusListener for EventRecorder {
    fn builder_added(&mut self, name: &str) -> Result<()> {
        debug!(builder = name, "builder added");
        self.watched.insert(name.to_string());
        self.set_builder_status(name, STATUS_OFFLINE)
    }

    fn builder_changed_state(&mut self, name: &str, state: &str) -> Result<()> {
        debug!(builder = name, state, "builder changed state");
        self.set_builder_status(name, state)
    }

    fn builder_removed(&mut self, name: &str) -> Result<()> {
        if !self.watched.remove(name) {
            warn!(builder = name, "removed builder was not being watched");
        }
        Ok(())
    }

    fn build_started(&mut self, build: &BuildInfo) -> Result<()> {
        let key = build.key();
        if self.builds.contains_key(&key) {
            warn!(builder = %build.builder, number = build.number, "build started twice, replacing record");
            self.steps.retain(|step, _| step.build != key);
        }

        let record = BuildRecord::new(
            build.builder.clone(),
            build.workers.clone(),
            build.number,
            build.started_at,
        );
        self.store.insert_build(&record)?;
        debug!(builder = %build.builder, number = build.number, id = %record.id, "build started");

        self.builds.insert(key, record);
        Ok(())
    }

    fn build_finished(&mut self, build: &BuildInfo, results: &BuildResults) -> Result<()> {
        let store = Arc::clone(&self.store);
        let record = self.build_mut(build)?;
        record.time_end = Some(build.finished_at.unwrap_or_else(chrono::Utc::now));
        record.result = Some(results.result);
        store.save_build(record)?;
        debug!(builder = %build.builder, number = build.number, result = results.result, "build finished");

        let key = build.key();
        self.builds.remove(&key);
        self.steps.retain(|step, _| step.build != key);
        Ok(())
    }

    fn step_started(&mut self, build: &BuildInfo, step: &StepInfo) -> Result<()> {
        let store = Arc::clone(&self.store);
        let key = StepKey::new(build, step);
        if self.steps.contains_key(&key) {
            warn!(builder = %build.builder, number = build.number, step = %step.name, "step started twice, replacing record");
        }

        let parent = self.build_mut(build)?;
        let record = StepRecord::new(parent.id.clone(), step.name.clone(), step.started_at);
        store.insert_step(&record)?;

        parent.steps.push(record.id.clone());
        store.save_build(parent)?;
        debug!(builder = %build.builder, number = build.number, step = %step.name, "step started");

        self.steps.insert(key, record);
        Ok(())
    }

    fn step_finished(&mut self, build: &BuildInfo, step: &StepInfo, results: &StepResults) -> Result<()> {
        let store = Arc::clone(&self.store);

        // Nothing is written unless the step is known.
        self.step_mut(build, step)?;

        let successful = results.is_success();
        if !successful {
            let parent = self.build_mut(build)?;
            parent.successful = false;
            store.save_build(parent)?;
        }

        let record = self.step_mut(build, step)?;
        record.result = Some(results.result);
        record.text = results.text.clone();
        record.successful = successful;
        record.time_end = Some(step.finished_at.unwrap_or_else(chrono::Utc::now));
        store.save_step(record)?;
        debug!(step = %step.name, result = results.result, successful, "step finished");
        Ok(())
    }

    fn log_started(&mut self, build: &BuildInfo, step: &StepInfo, log: &str) -> Result<()> {
        debug!(builder = %build.builder, number = build.number, step = %step.name, log, "log started");
        Ok(())
    }

    fn log_chunk(
        &mut self,
        build: &BuildInfo,
        step: &StepInfo,
        _log: &str,
        channel: Channel,
        text: &str,
    ) -> Result<()> {
        let store = Arc::clone(&self.store);
        let record = self.step_mut(build, step)?;
        record.buffer_mut(channel).push_str(text);
        store.save_step(record)
    }

    /// Replace the step's three buffers with the full content of `log`.
    ///
    /// Buffers are per step, not per log: when a step has several logs, the
    /// last one to finish determines the stored text.
    fn log_finished(
        &mut self,
        build: &BuildInfo,
        step: &StepInfo,
        log: &str,
        contents: &dyn LogSource,
    ) -> Result<()> {
        let store = Arc::clone(&self.store);
        let record = self.step_mut(build, step)?;
        for channel in Channel::ALL {
            *record.buffer_mut(channel) = contents.read_channel(channel);
        }
        store.save_step(record)?;
        debug!(step = %step.name, log, "log finished");
        Ok(())
    }
}
