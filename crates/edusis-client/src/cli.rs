//! Command-line interface definition.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// edusis - Your school calendar in the terminal
#[derive(Debug, Parser)]
#[command(name = "edusis")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "EDUSIS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Output events as JSON
    #[arg(long)]
    pub json: bool,

    /// Bypass the event cache
    #[arg(long, short)]
    pub refresh: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Events over the next days (the default)
    Upcoming {
        /// Number of days to look ahead
        #[arg(long, short, default_value = "7")]
        days: u32,
    },

    /// Events in a calendar month
    Month {
        /// Year, defaults to the current one
        #[arg(long)]
        year: Option<i32>,

        /// Month (1-12), defaults to the current one
        #[arg(long)]
        month: Option<u32>,
    },

    /// Events between two dates, both inclusive
    Range {
        /// First day (YYYY-MM-DD)
        from: NaiveDate,

        /// Last day (YYYY-MM-DD)
        to: NaiveDate,
    },

    /// Events until the end of the academic year
    AcademicYear,

    /// Fetch upcoming events and report the health of each source
    Status,

    /// Cache commands
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Google Calendar commands
    #[cfg(feature = "google")]
    Google {
        #[command(subcommand)]
        action: GoogleAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache actions.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Drop cached event lists for the configured user
    Clear,
}

/// Google Calendar actions.
#[cfg(feature = "google")]
#[derive(Debug, Subcommand)]
pub enum GoogleAction {
    /// Sign in with a school Google account, then show upcoming events
    SignIn {
        /// Number of days to look ahead
        #[arg(long, short, default_value = "7")]
        days: u32,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_range() {
        let cli = Cli::try_parse_from(["edusis", "--json", "range", "2025-09-01", "2025-09-30"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Some(Command::Range { from, to }) => {
                assert_eq!(from, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());
                assert_eq!(to, NaiveDate::from_ymd_opt(2025, 9, 30).unwrap());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn upcoming_defaults_to_a_week() {
        let cli = Cli::try_parse_from(["edusis", "upcoming"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Upcoming { days: 7 })));
        assert!(Cli::try_parse_from(["edusis", "range", "2025-13-01", "2025-12-01"]).is_err());
    }
}
