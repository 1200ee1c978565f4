use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use ferroscan_core::{
    DailyBarSource, FixtureSource, IntradayBarSource, PolygonClient, PolygonConfig, RawParams,
    ScanConfig, ScanPipeline, ScanRequest, Symbol, TradeDate,
};

use crate::cli::ScanArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &ScanArgs, strict: bool) -> Result<CommandResult, CliError> {
    let start = TradeDate::parse(&args.start)?;
    let end = TradeDate::parse(&args.end)?;
    let mut request = ScanRequest::new(start, end)?;
    if !args.tickers.is_empty() {
        let tickers = args
            .tickers
            .iter()
            .map(|raw| Symbol::parse_user(raw))
            .collect::<Result<Vec<_>, _>>()?;
        request = request.with_universe(tickers);
    }

    let config = load_config(args)?;
    let (daily, intraday) = sources(args)?;
    let pipeline = ScanPipeline::new(daily, intraday, config)?;
    let outcome = pipeline.run(request).await?;

    let report = &outcome.report;
    let rows = outcome
        .signals
        .iter()
        .map(|signal| {
            vec![
                signal.date.to_string(),
                signal.ticker.to_string(),
                signal.matched_patterns.join(","),
                format!("{:.0}", signal.trailing_avg_premarket_dollar_volume),
            ]
        })
        .collect();
    let warnings = report
        .gaps
        .iter()
        .map(|gap| format!("no data for {}: {}", gap.date, gap.error))
        .chain(report.validation_errors.iter().map(|error| {
            format!("validation failed for {} {}: {}", error.ticker, error.date, error.message)
        }))
        .chain(report.notes.iter().cloned())
        .collect();

    let mut result = CommandResult::new(serde_json::to_value(&outcome)?)
        .with_summary("run_id", report.run_id)
        .with_summary("status", report.status.as_str())
        .with_summary("window", format!("{} .. {}", report.start, report.end))
        .with_summary("days", format!("{}/{} fetched", report.trading_days_fetched, report.trading_days_requested))
        .with_summary("candidates", report.candidates_before_validation)
        .with_summary("signals", report.candidates_after_validation)
        .with_summary("elapsed_ms", report.elapsed_ms)
        .with_table(vec!["date", "ticker", "patterns", "avg_premarket_usd"], rows)
        .with_warnings(warnings);

    if strict && report.is_partial() {
        result.strict_failure = Some(CliError::StrictModeViolation {
            status: report.status.as_str(),
            gaps: report.gaps.len(),
            errors: report.validation_errors.len(),
        });
    }
    Ok(result)
}

/// Config file first, then the params file, then individual flags.
fn load_config(args: &ScanArgs) -> Result<ScanConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::from_json(&read(path)?)?,
        None => ScanConfig::default(),
    };

    if let Some(path) = &args.params {
        let params: BTreeMap<String, RawParams> = serde_json::from_str(&read(path)?)?;
        for (pattern, overrides) in params {
            config
                .patterns
                .params
                .entry(pattern)
                .or_default()
                .extend(overrides);
        }
    }
    if !args.patterns.is_empty() {
        config.patterns.selected = args.patterns.clone();
    }
    if let Some(floor) = args.min_premarket_dollar_volume {
        config.validation.min_premarket_dollar_volume = floor;
    }
    if args.enable_next_day_validation {
        config.validation.enable_next_day_validation = true;
    }
    if let Some(workers) = args.workers {
        config.fetch.workers = workers;
    }
    Ok(config)
}

fn sources(args: &ScanArgs) -> Result<(Arc<dyn DailyBarSource>, Arc<dyn IntradayBarSource>), CliError> {
    match &args.fixture {
        Some(path) => {
            let fixture = Arc::new(FixtureSource::from_json(&read(path)?)?);
            tracing::info!(path = %path.display(), tickers = fixture.tickers().len(), "using fixture source");
            Ok((fixture.clone(), fixture))
        }
        None => {
            let client = Arc::new(PolygonClient::new(PolygonConfig::from_env()?));
            Ok((client.clone(), client))
        }
    }
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|error| {
        std::io::Error::new(error.kind(), format!("cannot read '{}': {error}", path.display())).into()
    })
}
