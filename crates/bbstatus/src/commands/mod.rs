//! Command implementations for bbstatus CLI.
//!
//! Each submodule implements the logic for one subcommand.

pub mod builders;
pub mod builds;
pub mod doctor;
pub mod record;
pub mod show;

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};

/// Short form of a document id for tables.
pub(crate) fn short_id(id: &str) -> &str {
    if id.len() >= 8 { &id[..8] } else { id }
}

pub(crate) fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Colored label for a build or step outcome.
pub(crate) fn outcome(finished: bool, successful: bool) -> ColoredString {
    match (finished, successful) {
        (false, _) => "running".yellow(),
        (true, true) => "success".green(),
        (true, false) => "failed".red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_format_time() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 9).unwrap();
        assert_eq!(format_time(&time), "2024-05-01 12:00:09");
    }

    #[test]
    fn test_outcome_labels() {
        assert!(outcome(false, true).to_string().contains("running"));
        assert!(outcome(true, true).to_string().contains("success"));
        assert!(outcome(true, false).to_string().contains("failed"));
    }
}
