//! Store configuration
//!
//! Connection settings handed to the recorder at construction time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default MongoDB host
pub const DEFAULT_HOST: &str = "localhost";

/// Default MongoDB port
pub const DEFAULT_PORT: u16 = 27017;

/// Which document store backs the recorder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// MongoDB server reached over the network
    #[default]
    Mongo,
    /// Local SQLite file holding JSON documents
    Sqlite,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Mongo => write!(f, "mongo"),
            Backend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(Backend::Mongo),
            "sqlite" => Ok(Backend::Sqlite),
            other => Err(ConfigValidationError::InvalidValue {
                field: "backend".into(),
                message: format!("unknown backend '{}'", other),
            }),
        }
    }
}

/// Store configuration options
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage backend (default: mongo)
    #[serde(default)]
    pub backend: Backend,

    /// Database name
    #[serde(default)]
    pub database: String,

    /// Database host (default: localhost)
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port (default: 27017)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username, authenticated against `database`
    #[serde(default)]
    pub username: Option<String>,

    /// Password for `username`
    #[serde(default)]
    pub password: Option<String>,

    /// SQLite file (sqlite backend only)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Identifier of the orchestrator instance owning the builders
    #[serde(default)]
    pub master_id: Option<String>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            database: String::new(),
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            path: None,
            master_id: None,
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("path", &self.path)
            .field("master_id", &self.master_id)
            .finish()
    }
}

impl StoreConfig {
    /// Create a config for `database` with default host and port.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Whether credentials were supplied.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }

    /// `host:port` as shown in logs.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the SQLite file location.
    ///
    /// Falls back to `<data dir>/bbstatus/<database>.db`.
    pub fn sqlite_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bbstatus")
            .join(format!("{}.db", self.database))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.trim().is_empty() {
            return Err(ConfigValidationError::MissingDatabase);
        }

        if self.backend == Backend::Mongo {
            if self.host.trim().is_empty() {
                return Err(ConfigValidationError::InvalidValue {
                    field: "host".into(),
                    message: "must not be empty".into(),
                });
            }

            if self.port == 0 {
                return Err(ConfigValidationError::InvalidValue {
                    field: "port".into(),
                    message: "must be greater than 0".into(),
                });
            }
        }

        match (&self.username, &self.password) {
            (Some(_), None) => Err(ConfigValidationError::InvalidValue {
                field: "password".into(),
                message: "required when username is set".into(),
            }),
            (None, Some(_)) => Err(ConfigValidationError::InvalidValue {
                field: "username".into(),
                message: "required when password is set".into(),
            }),
            _ => Ok(()),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("database name is required")]
    MissingDatabase,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
