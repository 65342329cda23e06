//! Replay an event stream into the store.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use anyhow::{Context, Result};
use bbstatus_core::{Dispatcher, ReplayStats};
use colored::Colorize;
use tracing::info;

use crate::cli::RecordCommand;
use crate::config::Config;
use crate::database::open_recorder;

/// Execute record command.
pub fn execute(cmd: RecordCommand, config: &Config) -> Result<()> {
    let recorder = open_recorder(config)?;
    let mut dispatcher = Dispatcher::new();
    dispatcher.subscribe(recorder);

    let stats = if cmd.input == "-" {
        replay(&mut dispatcher, io::stdin().lock(), "stdin")?
    } else {
        let file = File::open(&cmd.input).with_context(|| format!("Failed to open {}", cmd.input))?;
        replay(&mut dispatcher, BufReader::new(file), &cmd.input)?
    };

    print_summary(&stats);
    Ok(())
}

fn replay<R: BufRead>(dispatcher: &mut Dispatcher<'_>, reader: R, source: &str) -> Result<ReplayStats> {
    info!(source, "replaying events");
    let stats = dispatcher
        .replay(reader)
        .with_context(|| format!("Failed to record events from {}", source))?;
    if dispatcher.open_logs() > 0 {
        info!(open = dispatcher.open_logs(), "stream ended with unfinished logs");
    }
    Ok(stats)
}

fn print_summary(stats: &ReplayStats) {
    println!("{} Recorded {} events", "✓".green(), stats.events.to_string().bold());
    for (kind, count) in &stats.by_kind {
        println!("    {:<24} {}", kind, count);
    }
    if stats.skipped > 0 {
        println!("  {} blank or comment lines skipped", stats.skipped.to_string().dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbstatus_core::Backend;
    use tempfile::tempdir;

    #[test]
    fn test_record_file_into_sqlite() {
        let temp = tempdir().expect("Failed to create temp dir");
        let events = temp.path().join("events.jsonl");
        std::fs::write(
            &events,
            "{\"event\":\"builder_added\",\"name\":\"linux-x64\"}\n\
             {\"event\":\"builder_changed_state\",\"name\":\"linux-x64\",\"state\":\"building\"}\n",
        )
        .expect("Failed to write events");

        let mut config = Config::default();
        config.database.backend = Backend::Sqlite;
        config.database.database = "ci".into();
        config.database.path = Some(temp.path().join("ci.db"));

        execute(
            RecordCommand {
                input: events.display().to_string(),
            },
            &config,
        )
        .expect("Failed to record");

        let store = crate::database::open_store(&config).unwrap();
        let builders = store.list_builders(None).unwrap();
        assert_eq!(builders.len(), 1);
        assert_eq!(builders[0].status, "building");
    }

    #[test]
    fn test_record_missing_file_fails() {
        let temp = tempdir().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.database.backend = Backend::Sqlite;
        config.database.database = "ci".into();
        config.database.path = Some(temp.path().join("ci.db"));

        let result = execute(
            RecordCommand {
                input: temp.path().join("missing.jsonl").display().to_string(),
            },
            &config,
        );
        assert!(result.is_err());
    }
}
