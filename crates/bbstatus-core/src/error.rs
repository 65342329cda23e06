//! Error types for bbstatus-core.

use thiserror::Error;

use crate::config::ConfigValidationError;

/// Result type alias using bbstatus-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for recorder operations
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[cfg(feature = "mongo")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[cfg(feature = "mongo")]
    #[error("BSON conversion error: {0}")]
    Bson(String),

    #[error("Not authenticated to use database {database}: {reason}")]
    Authentication { database: String, reason: String },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Document already exists in {collection}: {id}")]
    DuplicateDocument { collection: String, id: String },

    #[error("Backend not available: {0}")]
    BackendUnavailable(String),

    // Host contract errors
    #[error("Unknown build: {builder} #{number}")]
    UnknownBuild { builder: String, number: u64 },

    #[error("Unknown step: {step} in {builder} #{number}")]
    UnknownStep {
        builder: String,
        number: u64,
        step: String,
    },

    #[error("Invalid event on line {line}: {message}")]
    Event { line: usize, message: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an authentication failure for `database`
    pub fn authentication(database: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            database: database.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error aborted startup because of bad credentials
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}
