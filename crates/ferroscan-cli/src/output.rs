use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(&result.data)?
            } else {
                serde_json::to_string(&result.data)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => {
            for line in render_table(result) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn render_table(result: &CommandResult) -> Vec<String> {
    let mut lines = Vec::new();
    for (key, value) in &result.summary {
        lines.push(format!("{key:<12}: {value}"));
    }
    if !result.summary.is_empty() {
        lines.push(String::new());
    }

    let widths: Vec<usize> = result
        .headers
        .iter()
        .enumerate()
        .map(|(column, header)| {
            result
                .rows
                .iter()
                .filter_map(|row| row.get(column))
                .map(String::len)
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    if !result.headers.is_empty() {
        lines.push(format_row(result.headers.iter().copied(), &widths));
        lines.push(
            widths
                .iter()
                .map(|width| "-".repeat(*width))
                .collect::<Vec<_>>()
                .join("  "),
        );
        for row in &result.rows {
            lines.push(format_row(row.iter().map(String::as_str), &widths));
        }
        if result.rows.is_empty() {
            lines.push(String::from("(no rows)"));
        }
    }

    if !result.warnings.is_empty() {
        lines.push(String::from("warnings:"));
        for warning in &result.warnings {
            lines.push(format!("  - {warning}"));
        }
    }
    lines
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn table_columns_are_padded_to_widest_cell() {
        let result = CommandResult::new(json!({}))
            .with_summary("status", "complete")
            .with_table(
                vec!["date", "ticker"],
                vec![vec![String::from("2025-02-18"), String::from("SMCI")]],
            );

        let lines = render_table(&result);
        assert_eq!(lines[0], "status      : complete");
        assert_eq!(lines[2], "date        ticker");
        assert_eq!(lines[3], "----------  ------");
        assert_eq!(lines[4], "2025-02-18  SMCI");
    }
}
