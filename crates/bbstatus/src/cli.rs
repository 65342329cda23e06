//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use bbstatus_core::Backend;
use clap::{Args, Parser, Subcommand};

/// CI build status recorder
///
/// Records builder, build, step and log events into a document database.
#[derive(Parser, Debug)]
#[command(name = "bbstatus")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: <data dir>/config.toml)
    #[arg(long, global = true, env = "BBSTATUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(flatten)]
    pub db: DbArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Database connection overrides. Each one beats the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct DbArgs {
    /// Storage backend: mongo or sqlite
    #[arg(long, global = true, env = "BBSTATUS_DB_BACKEND")]
    pub backend: Option<Backend>,

    /// Database name
    #[arg(long, global = true, env = "BBSTATUS_DB_NAME")]
    pub database: Option<String>,

    /// Database host
    #[arg(long, global = true, env = "BBSTATUS_DB_HOST")]
    pub host: Option<String>,

    /// Database port
    #[arg(long, global = true, env = "BBSTATUS_DB_PORT")]
    pub port: Option<u16>,

    /// Database username
    #[arg(long, global = true, env = "BBSTATUS_DB_USERNAME")]
    pub username: Option<String>,

    /// Database password
    #[arg(long, global = true, env = "BBSTATUS_DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// SQLite file (sqlite backend only)
    #[arg(long, global = true, env = "BBSTATUS_DB_PATH")]
    pub path: Option<PathBuf>,

    /// Orchestrator instance owning the builders
    #[arg(long, global = true, env = "BBSTATUS_DB_MASTER_ID")]
    pub master_id: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a JSON-lines event stream into the store
    Record(RecordCommand),

    /// List builders and their status
    Builders(BuildersCommand),

    /// List recent builds
    Builds(BuildsCommand),

    /// Show one build with its steps
    Show(ShowCommand),

    /// Run diagnostics
    Doctor,

    /// Show version
    Version,
}

#[derive(Args, Debug)]
pub struct RecordCommand {
    /// Event file, or - for stdin
    #[arg(default_value = "-")]
    pub input: String,
}

#[derive(Args, Debug)]
pub struct BuildersCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BuildsCommand {
    /// Only builds of this builder
    #[arg(short, long)]
    pub builder: Option<String>,

    /// Only builds that ran on this worker
    #[arg(short, long)]
    pub worker: Option<String>,

    /// Only builds still running
    #[arg(long, conflicts_with = "finished")]
    pub running: bool,

    /// Only finished builds
    #[arg(long)]
    pub finished: bool,

    /// Maximum number of builds
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ShowCommand {
    /// Build id
    pub build_id: String,

    /// Print step logs
    #[arg(long)]
    pub logs: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
