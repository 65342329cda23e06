//! Document storage for recorded events.
//!
//! Three collections hold the recorded state:
//!
//! | collection | document | indexed fields |
//! |---|---|---|
//! | `builders` | [`BuilderRecord`] | `master_id` |
//! | `builds` | [`BuildRecord`] | `builder`, `workers`, `time_end` |
//! | `steps` | [`StepRecord`] | `build`, `time_end`, `successful` |
//!
//! Backends implement [`DocumentStore`]. Saves are full-document upserts
//! keyed on `_id`; inserts refuse an id that already exists.

#[cfg(feature = "mongo")]
mod mongo;
mod sqlite;

#[cfg(feature = "mongo")]
pub use mongo::MongoStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use crate::config::{Backend, StoreConfig};
use crate::error::Result;
use crate::types::{BuildQuery, BuildRecord, BuilderRecord, StepRecord, BUILDERS, BUILDS, STEPS};

/// Single-field ascending indexes, per collection.
pub const INDEXES: &[(&str, &[&str])] = &[
    (BUILDS, &["builder", "workers", "time_end"]),
    (STEPS, &["build", "time_end", "successful"]),
    (BUILDERS, &["master_id"]),
];

/// Name given to the index on `field`, e.g. `builds_builder`.
pub fn index_name(collection: &str, field: &str) -> String {
    format!("{}_{}", collection, field)
}

/// Core trait for document storage operations.
///
/// Implementations handle the actual storage backend (MongoDB, SQLite).
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> Backend;

    /// Verify the configured credentials can use the database.
    fn authenticate(&self) -> Result<()>;

    /// Create the collection indexes if missing. Returns how many were created.
    fn ensure_indexes(&self) -> Result<usize>;

    // ── builders ────────────────────────────────────────────────────────────

    /// Find the builder document for `name` owned by `master_id`.
    fn find_builder(&self, name: &str, master_id: Option<&str>) -> Result<Option<BuilderRecord>>;

    /// Upsert a builder document.
    fn save_builder(&self, builder: &BuilderRecord) -> Result<()>;

    /// All builders owned by `master_id`, by name.
    fn list_builders(&self, master_id: Option<&str>) -> Result<Vec<BuilderRecord>>;

    // ── builds ──────────────────────────────────────────────────────────────

    /// Insert a new build document.
    fn insert_build(&self, build: &BuildRecord) -> Result<()>;

    /// Upsert a build document.
    fn save_build(&self, build: &BuildRecord) -> Result<()>;

    fn get_build(&self, id: &str) -> Result<Option<BuildRecord>>;

    /// Builds matching `query`, newest first.
    fn recent_builds(&self, query: &BuildQuery) -> Result<Vec<BuildRecord>>;

    // ── steps ───────────────────────────────────────────────────────────────

    /// Insert a new step document.
    fn insert_step(&self, step: &StepRecord) -> Result<()>;

    /// Upsert a step document.
    fn save_step(&self, step: &StepRecord) -> Result<()>;

    fn get_step(&self, id: &str) -> Result<Option<StepRecord>>;

    /// Steps referencing `build_id`, in start order.
    fn steps_for_build(&self, build_id: &str) -> Result<Vec<StepRecord>>;
}

/// Open the store selected by `config.backend`.
///
/// Does not authenticate or create indexes; see
/// [`EventRecorder::connect`](crate::recorder::EventRecorder::connect).
pub fn open(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    config.validate()?;
    match config.backend {
        #[cfg(feature = "mongo")]
        Backend::Mongo => Ok(Arc::new(MongoStore::connect(config)?)),
        #[cfg(not(feature = "mongo"))]
        Backend::Mongo => Err(crate::error::Error::BackendUnavailable(
            "mongo (built without the `mongo` feature)".into(),
        )),
        Backend::Sqlite => {
            if config.has_credentials() {
                tracing::warn!("sqlite backend ignores username/password");
            }
            let path = config.sqlite_path();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Ok(Arc::new(SqliteStore::open_path(&path)?))
        }
    }
}
