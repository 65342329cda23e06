//! Diagnostics command.

use std::path::Path;

use anyhow::Result;
use bbstatus_core::{store, Backend};
use colored::Colorize;

use crate::config::Config;

pub fn execute(config: &Config, explicit_path: Option<&Path>) -> Result<()> {
    println!("{}", "bbstatus Doctor".cyan().bold());
    println!("{}", "─".repeat(50));
    println!();

    let mut issues = Vec::new();
    let db = &config.database;

    // Check config file
    print!("  Config file: ");
    let config_path = explicit_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::config_path);
    if config_path.exists() {
        println!("{} ({})", "✓ exists".green(), config_path.display());
    } else {
        println!("{}", "○ not found (using defaults)".yellow());
    }

    // Check settings
    print!("  Settings: ");
    match db.validate() {
        Ok(()) => println!("{}", "✓ valid".green()),
        Err(e) => {
            println!("{}", format!("✗ {}", e).red());
            issues.push("Database settings are incomplete - set --database or BBSTATUS_DB_NAME");
        }
    }

    match db.backend {
        Backend::Mongo => println!("  Backend: mongo at {}", db.address()),
        Backend::Sqlite => println!("  Backend: sqlite at {}", db.sqlite_path().display()),
    }
    if let Some(master_id) = &db.master_id {
        println!("  Master ID: {}", master_id);
    }

    // Check connection, credentials and indexes
    if issues.is_empty() {
        print!("  Database: ");
        match store::open(db) {
            Ok(store) => match store.authenticate() {
                Ok(()) => {
                    println!("{}", "✓ connected".green());
                    print!("  Indexes: ");
                    match store.ensure_indexes() {
                        Ok(0) => println!("{}", "✓ present".green()),
                        Ok(created) => println!("{}", format!("✓ created {}", created).green()),
                        Err(e) => {
                            println!("{}", format!("✗ {}", e).red());
                            issues.push("Could not create indexes");
                        }
                    }
                }
                Err(e) if e.is_authentication() => {
                    println!("{}", format!("✗ {}", e).red());
                    issues.push("Authentication failed - check username and password");
                }
                Err(e) => {
                    println!("{}", format!("✗ {}", e).red());
                    issues.push("Database not reachable");
                }
            },
            Err(e) => {
                println!("{}", format!("✗ {}", e).red());
                issues.push("Database could not be opened");
            }
        }
    }

    // Summary
    println!();
    if issues.is_empty() {
        println!("{}", "✓ All checks passed".green().bold());
    } else {
        println!("{}", format!("✗ {} issue(s) found:", issues.len()).red().bold());
        for issue in &issues {
            println!("  • {}", issue);
        }
    }

    Ok(())
}
