//! bbstatus-core - Core library for bbstatus
//!
//! Records the lifecycle of CI builds into a document database:
//!
//! - **events**: host event types and the [`StatusListener`] interface
//! - **recorder**: [`EventRecorder`], the listener that persists events
//! - **dispatch**: [`Dispatcher`], a replay host for JSON-lines event streams
//! - **store**: [`DocumentStore`] backends (MongoDB, SQLite)
//! - **config**: database connection settings
//! - **types**: stored document shapes and result codes

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod recorder;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{Backend, StoreConfig};
pub use dispatch::{Dispatcher, ReplayStats};
pub use error::{Error, Result};
pub use events::{BuildInfo, StatusEvent, StatusListener, StepInfo};
pub use recorder::EventRecorder;
pub use store::DocumentStore;
pub use types::{BuildRecord, BuilderRecord, Channel, ResultCode, StepRecord};
