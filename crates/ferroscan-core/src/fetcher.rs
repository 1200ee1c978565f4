//! Bulk history fetcher: one grouped snapshot per trading day.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::calendar::TradingCalendar;
use crate::pool::WorkerPool;
use crate::retry::{Backoff, RetryConfig};
use crate::source::{DailyBarSource, SourceError};
use crate::throttle::RequestThrottle;
use crate::{DailyBar, ScanError, TradeDate, ValidationError};

/// Fetch-stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Calendar days fetched before `start` so early indicators are defined.
    pub warmup_calendar_days: u32,
    pub workers: usize,
    pub attempt_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Time one item may wait out an open provider circuit without spending retries.
    pub max_circuit_wait_ms: u64,
    /// Optional plan limit shared by all fetch workers.
    pub requests_per_minute: Option<u32>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            warmup_calendar_days: 180,
            workers: 32,
            attempt_timeout_ms: 15_000,
            max_retries: 4,
            backoff_base_ms: 250,
            backoff_max_ms: 5_000,
            max_circuit_wait_ms: 60_000,
            requests_per_minute: None,
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "fetch.workers",
                reason: String::from("must be at least 1"),
            });
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "fetch.attempt_timeout_ms",
                reason: String::from("must be greater than zero"),
            });
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ValidationError::InvalidConfig {
                field: "fetch.backoff_base_ms",
                reason: format!("must not exceed backoff_max_ms ({})", self.backoff_max_ms),
            });
        }
        if self.requests_per_minute == Some(0) {
            return Err(ValidationError::InvalidConfig {
                field: "fetch.requests_per_minute",
                reason: String::from("must be at least 1 when set"),
            });
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(self.backoff_base_ms),
                factor: 2.0,
                max: Duration::from_millis(self.backoff_max_ms),
                jitter: true,
            },
            max_circuit_wait: Duration::from_millis(self.max_circuit_wait_ms),
        }
    }

    pub fn worker_pool(&self) -> WorkerPool {
        WorkerPool::new(
            self.workers,
            self.retry_config(),
            Duration::from_millis(self.attempt_timeout_ms),
        )
        .with_throttle(self.requests_per_minute.map(RequestThrottle::per_minute))
    }
}

/// A trading day whose snapshot could not be fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchGap {
    pub date: TradeDate,
    pub attempts: u32,
    pub error: SourceError,
}

/// Merged output of one fetch run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchedHistory {
    pub warmup_start: Option<TradeDate>,
    /// Every trading day in `[warmup_start, end]`, ascending.
    pub trading_days: Vec<TradeDate>,
    pub fetched_days: usize,
    /// Sorted by `(date, ticker)`.
    pub bars: Vec<DailyBar>,
    pub gaps: Vec<FetchGap>,
    /// Days fetched successfully that carried no rows.
    pub empty_days: Vec<TradeDate>,
    pub malformed_bars: usize,
    pub bulk_requests: usize,
}

pub struct BulkHistoryFetcher {
    source: Arc<dyn DailyBarSource>,
    calendar: TradingCalendar,
    config: FetchConfig,
}

impl BulkHistoryFetcher {
    pub fn new(source: Arc<dyn DailyBarSource>, calendar: TradingCalendar, config: FetchConfig) -> Self {
        Self {
            source,
            calendar,
            config,
        }
    }

    pub fn warmup_start(&self, start: TradeDate) -> TradeDate {
        start.add_days(-i64::from(self.config.warmup_calendar_days))
    }

    /// Fetches every trading day from the warm-up start through `end`.
    ///
    /// Days that keep failing become gaps. Fails only when every requested
    /// day failed.
    pub async fn fetch(&self, start: TradeDate, end: TradeDate) -> Result<FetchedHistory, ScanError> {
        let warmup_start = self.warmup_start(start);
        let trading_days = self.calendar.trading_days(warmup_start, end);
        let mut history = FetchedHistory {
            warmup_start: Some(warmup_start),
            bulk_requests: trading_days.len(),
            ..FetchedHistory::default()
        };
        if trading_days.is_empty() {
            tracing::info!(%warmup_start, %end, "no trading days in fetch range");
            return Ok(history);
        }

        tracing::info!(
            source = self.source.id(),
            %warmup_start,
            %end,
            days = trading_days.len(),
            workers = self.config.workers,
            "fetching grouped daily snapshots"
        );

        let source = Arc::clone(&self.source);
        let results = self
            .config
            .worker_pool()
            .run("grouped_daily", trading_days.clone(), move |date| {
                let source = Arc::clone(&source);
                async move { source.grouped_daily(date).await }
            })
            .await;

        let mut last_error = None;
        for (date, result) in results {
            match result {
                Ok(snapshot) => {
                    history.fetched_days += 1;
                    history.malformed_bars += snapshot.malformed;
                    if snapshot.is_empty() {
                        history.empty_days.push(date);
                    }
                    history.bars.extend(snapshot.bars);
                }
                Err(failure) => {
                    last_error = Some(failure.error.clone());
                    history.gaps.push(FetchGap {
                        date,
                        attempts: failure.attempts,
                        error: failure.error,
                    });
                }
            }
        }
        history.trading_days = trading_days;

        if history.fetched_days == 0 {
            let last_error =
                last_error.unwrap_or_else(|| SourceError::internal("no fetch result recorded"));
            return Err(ScanError::UpstreamUnavailable {
                stage: "grouped daily",
                requested: history.trading_days.len(),
                last_error,
            });
        }

        history
            .bars
            .sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.ticker.cmp(&b.ticker)));

        tracing::info!(
            fetched = history.fetched_days,
            gaps = history.gaps.len(),
            empty = history.empty_days.len(),
            bars = history.bars.len(),
            malformed = history.malformed_bars,
            "fetch complete"
        );
        Ok(history)
    }
}
