//! CLI argument definitions for ferroscan.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Run the pattern scan over a date window |
//! | `patterns` | List registered rules and their parameters |
//! | `calendar` | List trading days in a window |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Exit 5 when a run is partial |
//! | `-v` / `--quiet` | info | Log verbosity on stderr |
//!
//! # Examples
//!
//! ```bash
//! # Scan January 2025 with the default rules
//! ferroscan scan --start 2025-01-02 --end 2025-01-31 --pretty
//!
//! # Only patternC, with a stricter liquidity floor
//! ferroscan scan --start 2025-02-18 --end 2025-02-18 --pattern patternC \
//!     --min-premarket-dollar-volume 25000000
//!
//! # Offline run against a recorded fixture
//! ferroscan scan --start 2025-02-18 --end 2025-02-18 --fixture fixture.json
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

/// Market-wide technical pattern scanner.
#[derive(Debug, Parser)]
#[command(
    name = "ferroscan",
    author,
    version,
    about = "Market-wide technical pattern scanner",
    long_about = "ferroscan fetches grouped daily bars for every trading day in a window, \
computes per-ticker indicators, evaluates named pattern rules and keeps the matches \
whose trailing pre-market dollar volume clears a liquidity floor.\n\
\n\
Set FERROSCAN_POLYGON_API_KEY (or POLYGON_API_KEY) for live runs."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat a partial run (fetch gaps, failed validations) as a failure (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, default_value_t = false, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format for terminal display.
    Table,
    /// Single JSON object output.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan a date window for pattern signals.
    Scan(ScanArgs),
    /// List the pattern catalogue.
    Patterns(PatternsArgs),
    /// List trading days and closures in a window.
    Calendar(CalendarArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// First signal date (YYYY-MM-DD).
    #[arg(long)]
    pub start: String,

    /// Last signal date (YYYY-MM-DD), inclusive.
    #[arg(long)]
    pub end: String,

    /// Restrict the scan to these tickers (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub tickers: Vec<String>,

    /// JSON scan configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JSON file of per-rule parameter overrides, keyed by rule name.
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Evaluate only these rules (repeatable).
    #[arg(long = "pattern")]
    pub patterns: Vec<String>,

    /// Override the trailing pre-market dollar-volume floor.
    #[arg(long)]
    pub min_premarket_dollar_volume: Option<f64>,

    /// Reject signals whose next session opens far below the signal close.
    #[arg(long, default_value_t = false)]
    pub enable_next_day_validation: bool,

    /// Override the bulk fetch worker count.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Read bars from a JSON fixture instead of the live provider.
    #[arg(long)]
    pub fixture: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PatternsArgs {
    /// Show only this rule.
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Args)]
pub struct CalendarArgs {
    #[arg(long)]
    pub start: String,

    #[arg(long)]
    pub end: String,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_scan_overrides() {
        let cli = Cli::try_parse_from([
            "ferroscan",
            "scan",
            "--start",
            "2025-02-18",
            "--end",
            "2025-02-19",
            "--tickers",
            "SMCI,SBET",
            "--pattern",
            "patternA",
            "--pattern",
            "patternC",
            "--min-premarket-dollar-volume",
            "5000000",
            "-vv",
        ])
        .expect("valid arguments");

        assert_eq!(cli.verbose, 2);
        let Command::Scan(args) = cli.command else {
            panic!("expected scan command");
        };
        assert_eq!(args.tickers, vec!["SMCI", "SBET"]);
        assert_eq!(args.patterns, vec!["patternA", "patternC"]);
        assert_eq!(args.min_premarket_dollar_volume, Some(5_000_000.0));
    }
}
