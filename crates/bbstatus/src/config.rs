//! Configuration management for bbstatus.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Command line flags
//! 2. Environment variables (BBSTATUS_DB_*)
//! 3. Config file (BBSTATUS_CONFIG or <data dir>/config.toml)
//! 4. Default values
//!
//! Flags and environment variables are merged by clap before they reach
//! [`Config::with_overrides`].

use anyhow::{Context, Result};
use bbstatus_core::StoreConfig;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::DbArgs;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Document store settings
    #[serde(default)]
    pub database: StoreConfig,
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("org", "bbstatus", "bbstatus") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".bbstatus")
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => Self::config_path(),
        };

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))
    }

    /// Get the default config file path.
    pub fn config_path() -> PathBuf {
        default_data_dir().join("config.toml")
    }

    /// Apply flag and environment overrides on top of the file settings.
    pub fn with_overrides(mut self, args: &DbArgs) -> Self {
        let db = &mut self.database;
        if let Some(backend) = args.backend {
            db.backend = backend;
        }
        if let Some(database) = &args.database {
            db.database = database.clone();
        }
        if let Some(host) = &args.host {
            db.host = host.clone();
        }
        if let Some(port) = args.port {
            db.port = port;
        }
        if args.username.is_some() {
            db.username = args.username.clone();
        }
        if args.password.is_some() {
            db.password = args.password.clone();
        }
        if args.path.is_some() {
            db.path = args.path.clone();
        }
        if args.master_id.is_some() {
            db.master_id = args.master_id.clone();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbstatus_core::Backend;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.database.backend, Backend::Mongo);
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 27017);
        assert!(config.database.database.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[database]\nbackend = \"sqlite\"\ndatabase = \"ci\"\nmaster_id = \"master-a\"\n",
        )
        .expect("Failed to write config");

        let config = Config::load(Some(&path)).expect("Failed to load config");

        assert_eq!(config.database.backend, Backend::Sqlite);
        assert_eq!(config.database.database, "ci");
        assert_eq!(config.database.master_id.as_deref(), Some("master-a"));
        assert_eq!(config.database.port, 27017);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = tempdir().expect("Failed to create temp dir");
        assert!(Config::load(Some(&temp.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[database\n").expect("Failed to write config");

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_overrides_beat_file() {
        let mut config = Config::default();
        config.database.database = "from-file".into();
        config.database.host = "db.internal".into();

        let args = DbArgs {
            database: Some("from-flag".into()),
            port: Some(27018),
            ..Default::default()
        };
        let config = config.with_overrides(&args);

        assert_eq!(config.database.database, "from-flag");
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 27018);
    }

    #[test]
    fn test_config_path_is_toml() {
        assert!(Config::config_path().ends_with("config.toml"));
    }
}
