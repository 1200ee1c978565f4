use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::calendar::session_of;
use crate::source::{
    DailyBarSource, DailySnapshot, IntradayBarSource, IntradayRequest, SourceError, SourceFuture,
};
use crate::{DailyBar, IntradayBar, Symbol, TradeDate};

/// Serialized fixture layout: `{"daily": [...], "intraday": {"TICKER": [...]}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureData {
    #[serde(default)]
    pub daily: Vec<DailyBar>,
    #[serde(default)]
    pub intraday: BTreeMap<Symbol, Vec<IntradayBar>>,
}

/// Deterministic in-memory provider for offline runs and tests.
///
/// Counts every call and can be told to fail specific days or tickers
/// permanently.
#[derive(Debug, Default)]
pub struct FixtureSource {
    daily: BTreeMap<TradeDate, Vec<DailyBar>>,
    malformed: BTreeMap<TradeDate, usize>,
    intraday: BTreeMap<Symbol, Vec<IntradayBar>>,
    failing_days: BTreeSet<TradeDate>,
    failing_tickers: BTreeSet<Symbol>,
    daily_calls: AtomicUsize,
    intraday_calls: AtomicUsize,
    intraday_requests: Mutex<Vec<IntradayRequest>>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a source from deserialized data, re-validating every bar.
    ///
    /// Daily bars that fail validation are counted as malformed rows of
    /// their day; invalid intraday bars are dropped.
    pub fn from_data(data: FixtureData) -> Self {
        let mut source = Self::new();
        for bar in data.daily {
            match DailyBar::new(
                bar.ticker.clone(),
                bar.date,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume,
                bar.vwap,
            ) {
                Ok(bar) => source.daily.entry(bar.date).or_default().push(bar),
                Err(_) => *source.malformed.entry(bar.date).or_default() += 1,
            }
        }
        for (ticker, bars) in data.intraday {
            let valid = bars
                .into_iter()
                .filter_map(|bar| {
                    IntradayBar::new(bar.ts, bar.open, bar.high, bar.low, bar.close, bar.volume, bar.vwap).ok()
                })
                .collect();
            source = source.with_intraday(ticker, valid);
        }
        source
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<FixtureData>(json).map(Self::from_data)
    }

    pub fn with_daily(mut self, bars: impl IntoIterator<Item = DailyBar>) -> Self {
        for bar in bars {
            self.daily.entry(bar.date).or_default().push(bar);
        }
        self
    }

    pub fn with_intraday(mut self, ticker: Symbol, bars: Vec<IntradayBar>) -> Self {
        let entry = self.intraday.entry(ticker).or_default();
        entry.extend(bars);
        entry.sort_by_key(|bar| bar.ts);
        self
    }

    /// Makes every `grouped_daily(date)` call fail with a retryable error.
    pub fn fail_day(mut self, date: TradeDate) -> Self {
        self.failing_days.insert(date);
        self
    }

    /// Makes every intraday call for `ticker` fail with a retryable error.
    pub fn fail_ticker(mut self, ticker: Symbol) -> Self {
        self.failing_tickers.insert(ticker);
        self
    }

    pub fn daily_calls(&self) -> usize {
        self.daily_calls.load(Ordering::SeqCst)
    }

    pub fn intraday_calls(&self) -> usize {
        self.intraday_calls.load(Ordering::SeqCst)
    }

    pub fn intraday_requests(&self) -> Vec<IntradayRequest> {
        self.intraday_requests
            .lock()
            .expect("fixture request log is not poisoned")
            .clone()
    }

    pub fn tickers(&self) -> BTreeSet<Symbol> {
        self.daily
            .values()
            .flatten()
            .map(|bar| bar.ticker.clone())
            .collect()
    }

    fn snapshot(&self, date: TradeDate) -> Result<DailySnapshot, SourceError> {
        self.daily_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_days.contains(&date) {
            return Err(SourceError::unavailable(format!(
                "fixture day {date} is configured to fail"
            )));
        }
        Ok(DailySnapshot::new(
            date,
            self.daily.get(&date).cloned().unwrap_or_default(),
            self.malformed.get(&date).copied().unwrap_or_default(),
        ))
    }

    fn bars_for(&self, request: IntradayRequest) -> Result<Vec<IntradayBar>, SourceError> {
        self.intraday_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_tickers.contains(&request.ticker);
        let bars = self
            .intraday
            .get(&request.ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|bar| {
                        let (date, _) = session_of(bar.ts);
                        date >= request.from && date <= request.to
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let ticker = request.ticker.clone();
        self.intraday_requests
            .lock()
            .expect("fixture request log is not poisoned")
            .push(request);

        if failing {
            return Err(SourceError::unavailable(format!(
                "fixture ticker {ticker} is configured to fail"
            )));
        }
        Ok(bars)
    }
}

impl DailyBarSource for FixtureSource {
    fn id(&self) -> &'static str {
        "fixture"
    }

    fn grouped_daily<'a>(&'a self, date: TradeDate) -> SourceFuture<'a, DailySnapshot> {
        let result = self.snapshot(date);
        Box::pin(async move { result })
    }
}

impl IntradayBarSource for FixtureSource {
    fn id(&self) -> &'static str {
        "fixture"
    }

    fn intraday<'a>(&'a self, request: IntradayRequest) -> SourceFuture<'a, Vec<IntradayBar>> {
        let result = self.bars_for(request);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BarSize, UtcDateTime};

    fn date(value: &str) -> TradeDate {
        TradeDate::parse(value).expect("valid date")
    }

    #[tokio::test]
    async fn missing_day_is_an_empty_snapshot() {
        let source = FixtureSource::new();
        let snapshot = source
            .grouped_daily(date("2025-02-18"))
            .await
            .expect("fixture never fails unconfigured days");
        assert!(snapshot.is_empty());
        assert_eq!(source.daily_calls(), 1);
    }

    #[tokio::test]
    async fn invalid_json_rows_are_counted_as_malformed() {
        let json = r#"{
            "daily": [
                {"ticker": "AAA", "date": "2025-02-18", "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 100.0},
                {"ticker": "BBB", "date": "2025-02-18", "open": 1.0, "high": 0.5, "low": 2.0, "close": 1.5, "volume": 100.0}
            ]
        }"#;
        let source = FixtureSource::from_json(json).expect("valid json");

        let snapshot = source.grouped_daily(date("2025-02-18")).await.expect("ok");
        assert_eq!(snapshot.bars.len(), 1);
        assert_eq!(snapshot.malformed, 1);
    }

    #[tokio::test]
    async fn intraday_is_filtered_to_the_eastern_window() {
        let ticker = Symbol::parse("SBET").expect("valid");
        let bar = |ts: &str| {
            IntradayBar::new(UtcDateTime::parse(ts).expect("valid"), 1.0, 1.0, 1.0, 1.0, 10.0, None)
                .expect("valid bar")
        };
        let source = FixtureSource::new().with_intraday(
            ticker.clone(),
            vec![
                bar("2025-07-15T12:00:00Z"),
                bar("2025-07-16T12:00:00Z"),
                // 22:00 ET on 07-16.
                bar("2025-07-17T02:00:00Z"),
                bar("2025-07-17T12:00:00Z"),
            ],
        );

        let request =
            IntradayRequest::new(ticker, date("2025-07-16"), date("2025-07-16"), BarSize::default())
                .expect("valid window");
        let bars = source.intraday(request).await.expect("ok");
        assert_eq!(bars.len(), 2);
        assert_eq!(source.intraday_calls(), 1);
    }

    #[tokio::test]
    async fn configured_failures_are_retryable() {
        let ticker = Symbol::parse("FAIL").expect("valid");
        let source = FixtureSource::new()
            .fail_day(date("2025-02-18"))
            .fail_ticker(ticker.clone());

        let day = source.grouped_daily(date("2025-02-18")).await.expect_err("fails");
        assert!(day.retryable());

        let request =
            IntradayRequest::new(ticker, date("2025-02-12"), date("2025-02-19"), BarSize::default())
                .expect("valid window");
        let intraday = source.intraday(request).await.expect_err("fails");
        assert!(intraday.retryable());
        assert_eq!(source.intraday_requests().len(), 1);
    }
}
