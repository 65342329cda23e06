//! List recent builds.

use anyhow::{Context, Result};
use bbstatus_core::types::BuildQuery;
use bbstatus_core::BuildRecord;
use colored::Colorize;

use super::{format_time, outcome, short_id};
use crate::cli::BuildsCommand;
use crate::config::Config;
use crate::database::open_store;

/// Execute builds command.
pub fn execute(cmd: BuildsCommand, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let query = query_for(&cmd);
    let builds = store
        .recent_builds(&query)
        .context("Failed to list builds")?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&builds)?);
        return Ok(());
    }

    if builds.is_empty() {
        println!("{} No builds found", "⚠".yellow());
        return Ok(());
    }

    println!("{} {} builds:", "✓".green(), builds.len());
    println!();
    for build in &builds {
        print_build(build);
    }

    Ok(())
}

fn query_for(cmd: &BuildsCommand) -> BuildQuery {
    let finished = match (cmd.running, cmd.finished) {
        (true, _) => Some(false),
        (_, true) => Some(true),
        _ => None,
    };
    BuildQuery {
        builder: cmd.builder.clone(),
        worker: cmd.worker.clone(),
        finished,
        limit: Some(cmd.limit),
    }
}

fn print_build(build: &BuildRecord) {
    println!(
        "  {} {} #{} [{}]",
        short_id(&build.id).cyan(),
        build.builder.bold(),
        build.number,
        outcome(build.is_finished(), build.successful)
    );
    let mut line = format!("     started {}", format_time(&build.time_start));
    if let Some(end) = &build.time_end {
        line.push_str(&format!(", ended {}", format_time(end)));
    }
    if !build.workers.is_empty() {
        line.push_str(&format!(", workers {}", build.workers.join(", ")));
    }
    println!("{}", line.dimmed());
}
