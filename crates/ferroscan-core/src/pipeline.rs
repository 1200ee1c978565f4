//! End-to-end scan: fetch, features, patterns, validation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::calendar::TradingCalendar;
use crate::features::{FeatureConfig, FeatureEngine};
use crate::fetcher::{BulkHistoryFetcher, FetchConfig};
use crate::patterns::{PatternCatalogue, PatternEngine, RawParams, ResolvedCatalogue};
use crate::report::RunReport;
use crate::source::{DailyBarSource, IntradayBarSource};
use crate::validation::{ValidationConfig, ValidationEngine};
use crate::{ScanError, Symbol, TradeDate, ValidatedSignal, ValidationError};

/// Pattern selection and parameter overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatternConfig {
    /// Per-rule overrides keyed by rule name.
    pub params: BTreeMap<String, RawParams>,
    /// Rules to evaluate; empty selects every registered rule.
    pub selected: Vec<String>,
}

/// Whole-run configuration. Every field has a default, so `{}` is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub fetch: FetchConfig,
    pub features: FeatureConfig,
    pub patterns: PatternConfig,
    pub validation: ValidationConfig,
}

impl ScanConfig {
    pub fn from_json(json: &str) -> Result<Self, ScanError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.fetch.validate()?;
        self.features.validate()?;
        self.validation.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub start: TradeDate,
    pub end: TradeDate,
    /// Restricts the scan to these tickers, matched ignoring ASCII case; `None` scans the whole market.
    pub universe: Option<BTreeSet<Symbol>>,
}

impl ScanRequest {
    pub fn new(start: TradeDate, end: TradeDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            start,
            end,
            universe: None,
        })
    }

    pub fn with_universe(mut self, tickers: impl IntoIterator<Item = Symbol>) -> Self {
        self.universe = Some(tickers.into_iter().collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    /// Sorted by date then ticker.
    pub signals: Vec<ValidatedSignal>,
    pub report: RunReport,
}

pub struct ScanPipeline {
    fetcher: BulkHistoryFetcher,
    features: FeatureEngine,
    catalogue: ResolvedCatalogue,
    validator: ValidationEngine,
}

impl ScanPipeline {
    /// Builds a pipeline over the standard pattern catalogue.
    pub fn new(
        daily: Arc<dyn DailyBarSource>,
        intraday: Arc<dyn IntradayBarSource>,
        config: ScanConfig,
    ) -> Result<Self, ScanError> {
        Self::with_catalogue(
            daily,
            intraday,
            config,
            &PatternCatalogue::standard(),
            TradingCalendar::us_equities(),
        )
    }

    /// Validates `config` and binds its parameters to `catalogue` up front,
    /// so a bad configuration fails before any provider call.
    pub fn with_catalogue(
        daily: Arc<dyn DailyBarSource>,
        intraday: Arc<dyn IntradayBarSource>,
        config: ScanConfig,
        catalogue: &PatternCatalogue,
        calendar: TradingCalendar,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        let features = FeatureEngine::new(config.features.clone())?;
        let resolved = catalogue.resolve(
            &config.patterns.params,
            &config.patterns.selected,
            &config.features.widths(),
        )?;
        let validator = ValidationEngine::new(intraday, calendar.clone(), config.validation)?;

        Ok(Self {
            fetcher: BulkHistoryFetcher::new(daily, calendar, config.fetch),
            features,
            catalogue: resolved,
            validator,
        })
    }

    pub fn catalogue(&self) -> &ResolvedCatalogue {
        &self.catalogue
    }

    pub async fn run(&self, request: ScanRequest) -> Result<ScanOutcome, ScanError> {
        let started = Instant::now();
        let mut report = RunReport::new(request.start, request.end);
        tracing::info!(
            run_id = %report.run_id,
            start = %request.start,
            end = %request.end,
            patterns = ?self.catalogue.names(),
            "scan started"
        );

        let history = self.fetcher.fetch(request.start, request.end).await?;
        report.warmup_start = history.warmup_start;
        report.trading_days_requested = history.trading_days.len();
        report.trading_days_fetched = history.fetched_days;
        report.bulk_requests = history.bulk_requests;
        report.malformed_bars = history.malformed_bars;
        report.empty_days = history.empty_days;
        report.gaps = history.gaps;
        for gap in &report.gaps {
            tracing::warn!(date = %gap.date, attempts = gap.attempts, code = gap.error.code(), "trading day missing from history");
        }

        let mut bars = history.bars;
        if let Some(universe) = &request.universe {
            bars.retain(|bar| {
                universe.contains(&bar.ticker)
                    || universe.iter().any(|wanted| wanted.eq_ignore_case(&bar.ticker))
            });
        }

        let engine = self.features.clone();
        let panel = tokio::task::spawn_blocking(move || engine.build(&bars))
            .await
            .map_err(|err| ScanError::Internal(format!("feature build task failed: {err}")))?;
        report.duplicate_bars = panel.duplicate_bars();
        report.tickers_in_panel = panel.len();

        let candidates = PatternEngine.evaluate(&panel, &self.catalogue, request.start, request.end);
        report.candidates_before_validation = candidates.len();
        tracing::info!(candidates = candidates.len(), "pattern evaluation finished");

        let outcome = self.validator.validate(candidates).await;
        if let Some(last_error) = outcome.total_outage() {
            tracing::error!(
                run_id = %report.run_id,
                candidates = report.candidates_before_validation,
                code = last_error.code(),
                "every intraday fetch failed"
            );
            return Err(ScanError::UpstreamUnavailable {
                stage: "intraday",
                requested: report.candidates_before_validation,
                last_error: last_error.clone(),
            });
        }
        report.intraday_requests = outcome.intraday_requests;
        report.candidates_after_validation = outcome.validated.len();
        report.rejected = outcome.rejected;
        report.validation_errors = outcome.errors;
        report.notes = outcome.notes;

        report.finish(elapsed_ms(started));
        tracing::info!(
            run_id = %report.run_id,
            status = report.status.as_str(),
            signals = outcome.validated.len(),
            elapsed_ms = report.elapsed_ms,
            "scan finished"
        );

        Ok(ScanOutcome {
            signals: outcome.validated,
            report,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FixtureSource;

    fn date(value: &str) -> TradeDate {
        TradeDate::parse(value).expect("valid date")
    }

    #[test]
    fn empty_json_is_the_default_config() {
        let config = ScanConfig::from_json("{}").expect("valid");
        assert_eq!(config, ScanConfig::default());
    }

    #[test]
    fn unknown_config_fields_are_rejected() {
        let err = ScanConfig::from_json(r#"{"fetch": {"threads": 4}}"#).expect_err("unknown field");
        assert_eq!(err.code(), "scan.serialization");
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(ScanRequest::new(date("2025-02-19"), date("2025-02-18")).is_err());
    }

    #[test]
    fn unknown_pattern_fails_before_any_fetch() {
        let source = Arc::new(FixtureSource::new());
        let mut config = ScanConfig::default();
        config.patterns.selected = vec![String::from("patternQ")];

        let result = ScanPipeline::new(source.clone(), source.clone(), config);
        assert!(matches!(result, Err(ScanError::InvalidConfig(ValidationError::UnknownPattern { .. }))));
        assert_eq!(source.daily_calls(), 0);
    }

    #[tokio::test]
    async fn quiet_market_completes_with_no_signals() {
        let source = Arc::new(FixtureSource::new());
        let config = ScanConfig {
            fetch: FetchConfig {
                warmup_calendar_days: 3,
                ..FetchConfig::default()
            },
            ..ScanConfig::default()
        };
        let pipeline = ScanPipeline::new(source.clone(), source, config).expect("valid");

        let outcome = pipeline
            .run(ScanRequest::new(date("2025-02-18"), date("2025-02-18")).expect("valid"))
            .await
            .expect("scan runs");
        assert!(outcome.signals.is_empty());
        assert!(!outcome.report.is_partial());
        assert_eq!(outcome.report.intraday_requests, 0);
    }
}
