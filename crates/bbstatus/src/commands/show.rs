//! Show a build with its steps.

use anyhow::{Context, Result};
use bbstatus_core::types::ResultCode;
use bbstatus_core::{BuildRecord, Channel, StepRecord};
use colored::Colorize;
use serde::Serialize;

use super::{format_time, outcome};
use crate::cli::ShowCommand;
use crate::config::Config;
use crate::database::open_store;

#[derive(Serialize)]
struct BuildDetails {
    build: BuildRecord,
    steps: Vec<StepRecord>,
}

/// Execute show command.
pub fn execute(cmd: ShowCommand, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let build = store
        .get_build(&cmd.build_id)
        .context("Failed to load build")?
        .with_context(|| format!("Build not found: {}", cmd.build_id))?;
    let steps = store
        .steps_for_build(&build.id)
        .context("Failed to load steps")?;

    if cmd.json {
        let details = BuildDetails { build, steps };
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    println!(
        "{}",
        format!("Build {} #{}", build.builder, build.number).cyan().bold()
    );
    println!("{}", "─".repeat(50));
    println!("  ID:       {}", build.id);
    println!("  Status:   {}", outcome(build.is_finished(), build.successful));
    if let Some(code) = build.result {
        println!("  Result:   {}", ResultCode::label(code));
    }
    println!("  Started:  {}", format_time(&build.time_start));
    if let Some(end) = &build.time_end {
        println!("  Ended:    {}", format_time(end));
    }
    if !build.workers.is_empty() {
        println!("  Workers:  {}", build.workers.join(", "));
    }

    println!();
    if steps.is_empty() {
        println!("  {}", "No steps recorded".dimmed());
        return Ok(());
    }

    println!("  {}", "Steps:".cyan());
    for (i, step) in steps.iter().enumerate() {
        print_step(i + 1, step, cmd.logs);
    }

    Ok(())
}

fn print_step(index: usize, step: &StepRecord, logs: bool) {
    let finished = step.time_end.is_some();
    println!(
        "    {}. {} [{}]",
        index,
        step.name.bold(),
        outcome(finished, step.successful)
    );
    if !step.text.is_empty() {
        println!("       {}", step.text.join(" ").dimmed());
    }

    if !logs {
        return;
    }
    for channel in Channel::ALL {
        let text = step.buffer(channel);
        if text.is_empty() {
            continue;
        }
        println!("       {}", format!("── {} ──", channel).dimmed());
        for line in text.lines() {
            match channel {
                Channel::Stderr => println!("       {}", line.red()),
                Channel::Header => println!("       {}", line.dimmed()),
                Channel::Stdout => println!("       {}", line),
            }
        }
    }
}
