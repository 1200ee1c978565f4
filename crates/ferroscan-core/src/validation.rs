//! Validation engine: intraday liquidity screen for pattern candidates.
//!
//! One intraday request per candidate covers the trailing pre-market window
//! and, when enabled, the next session's open.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::calendar::{session_of, Session, TradingCalendar};
use crate::pool::WorkerPool;
use crate::retry::{Backoff, RetryConfig};
use crate::source::{IntradayBarSource, IntradayRequest, SourceError};
use crate::throttle::RequestThrottle;
use crate::{
    BarSize, CandidateSignal, IntradayBar, Symbol, TradeDate, ValidatedSignal, ValidationError,
    ValidationMetric,
};

/// Validation-stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    pub min_premarket_dollar_volume: f64,
    /// Trading days fetched before the signal day.
    pub days_before: u32,
    /// Trading days fetched after the signal day.
    pub days_after: u32,
    /// Sessions averaged, counting the signal day itself.
    pub trailing_days: u32,
    pub bar_size: BarSize,
    pub workers: usize,
    pub attempt_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Time one item may wait out an open provider circuit without spending retries.
    pub max_circuit_wait_ms: u64,
    pub requests_per_minute: Option<u32>,
    pub enable_next_day_validation: bool,
    /// Largest tolerated drop from the signal close to the next open, as a fraction.
    pub next_day_max_gap_down_pct: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_premarket_dollar_volume: 10_000_000.0,
            days_before: 4,
            days_after: 1,
            trailing_days: 5,
            bar_size: BarSize::default(),
            workers: 8,
            attempt_timeout_ms: 15_000,
            max_retries: 4,
            backoff_base_ms: 250,
            backoff_max_ms: 5_000,
            max_circuit_wait_ms: 60_000,
            requests_per_minute: None,
            enable_next_day_validation: false,
            next_day_max_gap_down_pct: 0.5,
        }
    }
}

impl ValidationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.min_premarket_dollar_volume.is_finite() || self.min_premarket_dollar_volume < 0.0 {
            return Err(ValidationError::InvalidConfig {
                field: "validation.min_premarket_dollar_volume",
                reason: String::from("must be a finite, non-negative number"),
            });
        }
        if self.trailing_days == 0 || self.trailing_days > self.days_before + 1 {
            return Err(ValidationError::InvalidConfig {
                field: "validation.trailing_days",
                reason: format!("must be between 1 and days_before + 1 ({})", self.days_before + 1),
            });
        }
        if self.enable_next_day_validation && self.days_after == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "validation.days_after",
                reason: String::from("next-day validation needs at least one session after the signal"),
            });
        }
        if self.workers == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "validation.workers",
                reason: String::from("must be at least 1"),
            });
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "validation.attempt_timeout_ms",
                reason: String::from("must be greater than zero"),
            });
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ValidationError::InvalidConfig {
                field: "validation.backoff_base_ms",
                reason: format!("must not exceed backoff_max_ms ({})", self.backoff_max_ms),
            });
        }
        if self.requests_per_minute == Some(0) {
            return Err(ValidationError::InvalidConfig {
                field: "validation.requests_per_minute",
                reason: String::from("must be at least 1 when set"),
            });
        }
        if !(0.0..=1.0).contains(&self.next_day_max_gap_down_pct) {
            return Err(ValidationError::InvalidConfig {
                field: "validation.next_day_max_gap_down_pct",
                reason: String::from("must be within [0, 1]"),
            });
        }
        Ok(())
    }

    pub fn worker_pool(&self) -> WorkerPool {
        let retry = RetryConfig {
            max_retries: self.max_retries,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(self.backoff_base_ms),
                factor: 2.0,
                max: Duration::from_millis(self.backoff_max_ms),
                jitter: true,
            },
            max_circuit_wait: Duration::from_millis(self.max_circuit_wait_ms),
        };
        WorkerPool::new(self.workers, retry, Duration::from_millis(self.attempt_timeout_ms))
            .with_throttle(self.requests_per_minute.map(RequestThrottle::per_minute))
    }
}

/// Why a candidate did not survive validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    InsufficientPremarketLiquidity { average: f64, threshold: f64 },
    NextDayGapDown { signal_close: f64, next_open: f64, floor: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub ticker: Symbol,
    pub date: TradeDate,
    pub matched_patterns: Vec<String>,
    #[serde(flatten)]
    pub reason: RejectionReason,
}

/// A candidate whose intraday data could not be obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub ticker: Symbol,
    pub date: TradeDate,
    pub attempts: u32,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationOutcome {
    /// Sorted by date then ticker.
    pub validated: Vec<ValidatedSignal>,
    pub metrics: Vec<ValidationMetric>,
    pub rejected: Vec<RejectedCandidate>,
    pub errors: Vec<ItemError>,
    pub notes: Vec<String>,
    pub intraday_requests: usize,
    /// Most recent provider error among failed fetches.
    pub last_error: Option<SourceError>,
}

impl ValidationOutcome {
    /// The provider error behind a run where every candidate failed to fetch.
    ///
    /// `None` when any candidate was judged, or when nothing reached the provider.
    pub fn total_outage(&self) -> Option<&SourceError> {
        if self.validated.is_empty() && self.rejected.is_empty() && !self.errors.is_empty() {
            self.last_error.as_ref()
        } else {
            None
        }
    }
}

pub struct ValidationEngine {
    source: Arc<dyn IntradayBarSource>,
    calendar: TradingCalendar,
    config: ValidationConfig,
}

impl ValidationEngine {
    pub fn new(
        source: Arc<dyn IntradayBarSource>,
        calendar: TradingCalendar,
        config: ValidationConfig,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            source,
            calendar,
            config,
        })
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Intraday request covering `candidate`'s trailing window and next session.
    pub fn request_for(&self, candidate: &CandidateSignal) -> Option<IntradayRequest> {
        let from = self.calendar.shift(candidate.date, -(self.config.days_before as i32));
        let to = self.calendar.shift(candidate.date, self.config.days_after as i32);
        IntradayRequest::new(candidate.ticker.clone(), from, to, self.config.bar_size).ok()
    }

    pub async fn validate(&self, candidates: Vec<CandidateSignal>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        if candidates.is_empty() {
            return outcome;
        }

        let mut planned = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.request_for(&candidate) {
                Some(request) => planned.push((candidate, request)),
                None => outcome.errors.push(ItemError {
                    ticker: candidate.ticker.clone(),
                    date: candidate.date,
                    attempts: 0,
                    code: String::from("source.invalid_request"),
                    message: String::from("could not build intraday window"),
                }),
            }
        }
        outcome.intraday_requests = planned.len();

        tracing::info!(
            source = self.source.id(),
            candidates = planned.len(),
            workers = self.config.workers,
            bar_size = %self.config.bar_size,
            "validating candidates against intraday liquidity"
        );

        let source = Arc::clone(&self.source);
        let results = self
            .config
            .worker_pool()
            .run("intraday", planned, move |(_, request): (CandidateSignal, IntradayRequest)| {
                let source = Arc::clone(&source);
                async move { source.intraday(request).await }
            })
            .await;

        for ((candidate, _), result) in results {
            match result {
                Ok(bars) => self.judge(candidate, &bars, &mut outcome),
                Err(failure) => {
                    tracing::warn!(
                        ticker = %candidate.ticker,
                        date = %candidate.date,
                        attempts = failure.attempts,
                        code = failure.error.code(),
                        "candidate excluded: intraday fetch failed"
                    );
                    outcome.errors.push(ItemError {
                        ticker: candidate.ticker,
                        date: candidate.date,
                        attempts: failure.attempts,
                        code: failure.error.code().to_owned(),
                        message: failure.error.message().to_owned(),
                    });
                    outcome.last_error = Some(failure.error);
                }
            }
        }

        outcome
            .validated
            .sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.ticker.cmp(&b.ticker)));
        tracing::info!(
            validated = outcome.validated.len(),
            rejected = outcome.rejected.len(),
            errors = outcome.errors.len(),
            "validation complete"
        );
        outcome
    }

    fn judge(&self, candidate: CandidateSignal, bars: &[IntradayBar], outcome: &mut ValidationOutcome) {
        let sessions = SessionSummary::collect(bars);
        let metric = self.trailing_metric(&candidate, &sessions);
        outcome.metrics.push(metric.clone());

        let threshold = self.config.min_premarket_dollar_volume;
        if metric.trailing_avg_premarket_dollar_volume < threshold {
            outcome.rejected.push(RejectedCandidate {
                ticker: candidate.ticker,
                date: candidate.date,
                matched_patterns: candidate.matched_patterns.into_iter().collect(),
                reason: RejectionReason::InsufficientPremarketLiquidity {
                    average: metric.trailing_avg_premarket_dollar_volume,
                    threshold,
                },
            });
            return;
        }

        if self.config.enable_next_day_validation {
            let next_day = self.calendar.next_trading_day(candidate.date);
            let signal_close = sessions.get(&candidate.date).and_then(|day| day.last_regular_close);
            let next_open = sessions.get(&next_day).and_then(|day| day.first_regular_open);
            match (signal_close, next_open) {
                (Some(signal_close), Some(next_open)) => {
                    let floor = signal_close * (1.0 - self.config.next_day_max_gap_down_pct);
                    if next_open < floor {
                        outcome.rejected.push(RejectedCandidate {
                            ticker: candidate.ticker,
                            date: candidate.date,
                            matched_patterns: candidate.matched_patterns.into_iter().collect(),
                            reason: RejectionReason::NextDayGapDown {
                                signal_close,
                                next_open,
                                floor,
                            },
                        });
                        return;
                    }
                }
                _ => outcome.notes.push(format!(
                    "next-day check skipped for {} {}: no regular-session prints on {} or {}",
                    candidate.ticker, candidate.date, candidate.date, next_day
                )),
            }
        }

        outcome
            .validated
            .push(ValidatedSignal::from_candidate(candidate, &metric));
    }

    fn trailing_metric(
        &self,
        candidate: &CandidateSignal,
        sessions: &BTreeMap<TradeDate, SessionSummary>,
    ) -> ValidationMetric {
        let days = self.config.trailing_days;
        let premarket: Vec<f64> = (0..days)
            .map(|back| self.calendar.shift(candidate.date, -(back as i32)))
            .filter_map(|day| sessions.get(&day))
            .map(|day| day.premarket_dollar_volume)
            .filter(|value| *value > 0.0)
            .collect();
        ValidationMetric {
            ticker: candidate.ticker.clone(),
            date: candidate.date,
            trailing_avg_premarket_dollar_volume: premarket.iter().sum::<f64>() / f64::from(days),
            window_days: days as usize,
            premarket_days: premarket.len(),
        }
    }
}

/// Per-session aggregates of one ticker's intraday bars.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct SessionSummary {
    premarket_dollar_volume: f64,
    first_regular_open: Option<f64>,
    last_regular_close: Option<f64>,
}

impl SessionSummary {
    /// Bars must be ascending by timestamp.
    fn collect(bars: &[IntradayBar]) -> BTreeMap<TradeDate, Self> {
        let mut sessions: BTreeMap<TradeDate, Self> = BTreeMap::new();
        for bar in bars {
            let (date, session) = session_of(bar.ts);
            let summary = sessions.entry(date).or_default();
            match session {
                Session::PreMarket => summary.premarket_dollar_volume += bar.dollar_volume(),
                Session::Regular => {
                    summary.first_regular_open.get_or_insert(bar.open);
                    summary.last_regular_close = Some(bar.close);
                }
                Session::AfterHours | Session::Closed => {}
            }
        }
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FixtureSource;
    use crate::UtcDateTime;

    fn date(value: &str) -> TradeDate {
        TradeDate::parse(value).expect("valid date")
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    fn bar(ts: &str, open: f64, close: f64, volume: f64) -> IntradayBar {
        let high = open.max(close);
        let low = open.min(close);
        IntradayBar::new(UtcDateTime::parse(ts).expect("valid ts"), open, high, low, close, volume, None)
            .expect("valid bar")
    }

    fn candidate(ticker: &str, day: &str) -> CandidateSignal {
        let mut candidate = CandidateSignal::new(symbol(ticker), date(day));
        candidate.matched_patterns.insert(String::from("patternA"));
        candidate
    }

    fn fast(config: ValidationConfig) -> ValidationConfig {
        ValidationConfig {
            max_retries: 1,
            backoff_base_ms: 1,
            backoff_max_ms: 1,
            ..config
        }
    }

    /// 2025-02-18 (EST): 13:00 UTC is 08:00 ET pre-market; 15:00 UTC is 10:00 ET.
    fn liquid_source() -> FixtureSource {
        FixtureSource::new().with_intraday(
            symbol("AAA"),
            vec![
                bar("2025-02-18T13:00:00Z", 60.0, 60.0, 1_000_000.0),
                bar("2025-02-18T15:00:00Z", 60.0, 62.0, 10_000.0),
                bar("2025-02-18T20:55:00Z", 62.0, 64.0, 10_000.0),
                bar("2025-02-19T14:30:00Z", 20.0, 21.0, 10_000.0),
            ],
        )
    }

    fn engine(source: FixtureSource, config: ValidationConfig) -> ValidationEngine {
        ValidationEngine::new(Arc::new(source), TradingCalendar::us_equities(), fast(config))
            .expect("valid config")
    }

    #[test]
    fn request_spans_four_sessions_back_and_one_forward() {
        let engine = engine(FixtureSource::new(), ValidationConfig::default());
        let request = engine.request_for(&candidate("AAA", "2025-02-18")).expect("request");
        // Presidents' Day 2025-02-17 is skipped.
        assert_eq!(request.from, date("2025-02-11"));
        assert_eq!(request.to, date("2025-02-19"));
        assert_eq!(request.bar_size, BarSize::minutes(5));
    }

    #[tokio::test]
    async fn averages_premarket_value_over_five_sessions() {
        let engine = engine(liquid_source(), ValidationConfig::default());
        let outcome = engine.validate(vec![candidate("AAA", "2025-02-18")]).await;

        assert_eq!(outcome.validated.len(), 1);
        let metric = &outcome.metrics[0];
        assert!((metric.trailing_avg_premarket_dollar_volume - 12_000_000.0).abs() < 1e-6);
        assert_eq!(metric.window_days, 5);
        assert_eq!(metric.premarket_days, 1);
        assert_eq!(outcome.intraday_requests, 1);
    }

    #[tokio::test]
    async fn threshold_above_average_rejects() {
        let config = ValidationConfig {
            min_premarket_dollar_volume: 12_000_001.0,
            ..ValidationConfig::default()
        };
        let outcome = engine(liquid_source(), config)
            .validate(vec![candidate("AAA", "2025-02-18")])
            .await;

        assert!(outcome.validated.is_empty());
        assert!(matches!(
            outcome.rejected[0].reason,
            RejectionReason::InsufficientPremarketLiquidity { .. }
        ));
    }

    #[tokio::test]
    async fn next_day_gap_down_only_matters_when_enabled() {
        let disabled = engine(liquid_source(), ValidationConfig::default())
            .validate(vec![candidate("AAA", "2025-02-18")])
            .await;
        assert_eq!(disabled.validated.len(), 1);

        let enabled_config = ValidationConfig {
            enable_next_day_validation: true,
            ..ValidationConfig::default()
        };
        let enabled = engine(liquid_source(), enabled_config)
            .validate(vec![candidate("AAA", "2025-02-18")])
            .await;
        assert!(enabled.validated.is_empty());
        assert!(matches!(
            enabled.rejected[0].reason,
            RejectionReason::NextDayGapDown { signal_close, next_open, .. }
                if signal_close == 64.0 && next_open == 20.0
        ));
    }

    #[tokio::test]
    async fn missing_next_day_prints_skip_the_check_with_a_note() {
        let source = FixtureSource::new().with_intraday(
            symbol("AAA"),
            vec![bar("2025-02-18T13:00:00Z", 60.0, 60.0, 1_000_000.0)],
        );
        let config = ValidationConfig {
            enable_next_day_validation: true,
            ..ValidationConfig::default()
        };
        let outcome = engine(source, config)
            .validate(vec![candidate("AAA", "2025-02-18")])
            .await;

        assert_eq!(outcome.validated.len(), 1);
        assert_eq!(outcome.notes.len(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_excludes_only_that_candidate() {
        let source = liquid_source()
            .with_intraday(symbol("BBB"), Vec::new())
            .fail_ticker(symbol("BBB"));
        let outcome = engine(source, ValidationConfig::default())
            .validate(vec![candidate("AAA", "2025-02-18"), candidate("BBB", "2025-02-18")])
            .await;

        assert_eq!(outcome.validated.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].ticker.as_str(), "BBB");
        assert_eq!(outcome.errors[0].attempts, 2);
        assert_eq!(outcome.errors[0].code, "source.unavailable");
        assert!(outcome.total_outage().is_none());
    }

    #[tokio::test]
    async fn every_fetch_failing_is_a_total_outage() {
        let source = liquid_source()
            .fail_ticker(symbol("AAA"))
            .fail_ticker(symbol("BBB"));
        let outcome = engine(source, ValidationConfig::default())
            .validate(vec![candidate("AAA", "2025-02-18"), candidate("BBB", "2025-02-18")])
            .await;

        assert_eq!(outcome.errors.len(), 2);
        let cause = outcome.total_outage().expect("nothing was judged");
        assert_eq!(cause.code(), "source.unavailable");
    }

    #[test]
    fn trailing_window_cannot_exceed_fetched_sessions() {
        let config = ValidationConfig {
            trailing_days: 6,
            ..ValidationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidConfig { field: "validation.trailing_days", .. })
        ));
    }
}
