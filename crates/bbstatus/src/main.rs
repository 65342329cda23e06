//! bbstatus - CI build status recorder
//!
//! Replays build lifecycle events into a document database and reports on
//! what was recorded.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;
mod database;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::from_default_env()
        .add_directive("bbstatus=info".parse()?)
        .add_directive("bbstatus_core=info".parse()?);
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    // Load configuration
    let config = config::Config::load(cli.config.as_deref())?.with_overrides(&cli.db);

    // Execute command
    match cli.command {
        Commands::Record(cmd) => commands::record::execute(cmd, &config),
        Commands::Builders(cmd) => commands::builders::execute(cmd, &config),
        Commands::Builds(cmd) => commands::builds::execute(cmd, &config),
        Commands::Show(cmd) => commands::show::execute(cmd, &config),
        Commands::Doctor => commands::doctor::execute(&config, cli.config.as_deref()),
        Commands::Version => {
            println!("bbstatus {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
