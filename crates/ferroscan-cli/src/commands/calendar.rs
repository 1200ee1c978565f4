use ferroscan_core::{TradeDate, TradingCalendar, ValidationError};

use crate::cli::CalendarArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &CalendarArgs) -> Result<CommandResult, CliError> {
    let start = TradeDate::parse(&args.start)?;
    let end = TradeDate::parse(&args.end)?;
    if start > end {
        return Err(ValidationError::InvalidDateRange {
            start: start.to_string(),
            end: end.to_string(),
        }
        .into());
    }

    let calendar = TradingCalendar::us_equities();
    let trading_days = calendar.trading_days(start, end);
    let mut closures = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        if calendar.is_holiday(cursor) {
            closures.push(cursor);
        }
        cursor = cursor.next_day();
    }

    let rows = trading_days
        .iter()
        .map(|day| vec![day.to_string(), day.weekday().to_string()])
        .collect();
    let data = serde_json::json!({
        "start": start,
        "end": end,
        "trading_days": trading_days,
        "closures": closures,
    });

    Ok(CommandResult::new(data)
        .with_summary("trading_days", trading_days.len())
        .with_summary(
            "closures",
            closures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        )
        .with_table(vec!["date", "weekday"], rows))
}
