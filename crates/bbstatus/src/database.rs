//! Store and recorder construction for commands.
//!
//! Reporting commands open the store directly; `record` goes through the
//! recorder so that authentication and index bootstrap run first.

use anyhow::{Context, Result};
use bbstatus_core::{store, DocumentStore, EventRecorder};
use std::sync::Arc;

use crate::config::Config;

/// Open the configured store and check the credentials.
pub fn open_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let db = &config.database;
    let store = store::open(db)
        .with_context(|| format!("Failed to open {} database '{}'", db.backend, db.database))?;
    store.authenticate().context("Failed to authenticate")?;
    Ok(store)
}

/// Open the store and prepare a recorder on it.
pub fn open_recorder(config: &Config) -> Result<EventRecorder> {
    EventRecorder::connect(&config.database).with_context(|| {
        format!(
            "Failed to connect to {} database '{}'",
            config.database.backend, config.database.database
        )
    })
}
