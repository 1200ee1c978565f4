mod calendar;
mod patterns;
mod scan;

use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Rendered output of one command.
pub struct CommandResult {
    /// JSON payload.
    pub data: Value,
    /// `key: value` lines shown above the table.
    pub summary: Vec<(&'static str, String)>,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
    pub warnings: Vec<String>,
    /// Set when a strict run must fail after output is written.
    pub strict_failure: Option<CliError>,
}

impl CommandResult {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            summary: Vec::new(),
            headers: Vec::new(),
            rows: Vec::new(),
            warnings: Vec::new(),
            strict_failure: None,
        }
    }

    pub fn with_summary(mut self, key: &'static str, value: impl ToString) -> Self {
        self.summary.push((key, value.to_string()));
        self
    }

    pub fn with_table(mut self, headers: Vec<&'static str>, rows: Vec<Vec<String>>) -> Self {
        self.headers = headers;
        self.rows = rows;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    match &cli.command {
        Command::Scan(args) => scan::run(args, cli.strict).await,
        Command::Patterns(args) => patterns::run(args),
        Command::Calendar(args) => calendar::run(args),
    }
}
