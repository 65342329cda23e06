//! List builder documents.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::cli::BuildersCommand;
use crate::config::Config;
use crate::database::open_store;

/// Execute builders command.
pub fn execute(cmd: BuildersCommand, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let master_id = config.database.master_id.as_deref();
    let builders = store
        .list_builders(master_id)
        .context("Failed to list builders")?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&builders)?);
        return Ok(());
    }

    if builders.is_empty() {
        println!("{} No builders recorded", "⚠".yellow());
        return Ok(());
    }

    println!("{}", "Builders".cyan().bold());
    println!("{}", "─".repeat(50));
    for builder in &builders {
        let status = match builder.status.as_str() {
            "offline" => builder.status.dimmed(),
            "idle" => builder.status.green(),
            _ => builder.status.yellow(),
        };
        println!("  {:<30} {}", builder.name, status);
    }

    Ok(())
}
