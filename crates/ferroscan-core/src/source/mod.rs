//! Market-data provider contracts.
//!
//! Two endpoints feed the pipeline:
//!
//! | Trait | Call | Used by |
//! |-------|------|---------|
//! | [`DailyBarSource`] | `grouped_daily(date)` | bulk history fetcher, once per trading day |
//! | [`IntradayBarSource`] | `intraday(request)` | validation engine, once per candidate |
//!
//! Both return boxed futures so implementations can be stored as
//! `Arc<dyn ...>` and shared across worker tasks.

mod cache;
mod fixture;
mod polygon;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BarSize, DailyBar, IntradayBar, Symbol, TradeDate};

pub use cache::{CacheMode, CachedDailySource};
pub use fixture::{FixtureData, FixtureSource};
pub use polygon::{PolygonClient, PolygonConfig};

/// Boxed future returned by provider calls.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Provider-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Unavailable,
    /// Turned away locally by an open circuit breaker; the provider was not called.
    CircuitOpen,
    RateLimited,
    Timeout,
    InvalidRequest,
    Malformed,
    Internal,
}

/// Structured provider error; `retryable` drives the worker pool's retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
            retry_after_ms: None,
        }
    }

    /// Rejection by an open circuit; `retry_after` is the time until the next trial call.
    pub fn circuit_open(message: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            kind: SourceErrorKind::CircuitOpen,
            message: message.into(),
            retryable: true,
            retry_after_ms: Some(u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
            retry_after_ms: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Timeout,
            message: message.into(),
            retryable: true,
            retry_after_ms: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
            retry_after_ms: None,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Malformed,
            message: message.into(),
            retryable: false,
            retry_after_ms: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
            retry_after_ms: None,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// Set only when the provider was not called and asks the caller to come back later.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::CircuitOpen => "source.circuit_open",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Malformed => "source.malformed",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// All tickers' bars for one trading day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySnapshot {
    pub date: TradeDate,
    pub bars: Vec<DailyBar>,
    /// Rows the provider returned that failed validation and were dropped.
    pub malformed: usize,
}

impl DailySnapshot {
    pub fn new(date: TradeDate, bars: Vec<DailyBar>, malformed: usize) -> Self {
        Self {
            date,
            bars,
            malformed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Request payload for one ticker's intraday window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntradayRequest {
    pub ticker: Symbol,
    pub from: TradeDate,
    pub to: TradeDate,
    pub bar_size: BarSize,
}

impl IntradayRequest {
    pub fn new(
        ticker: Symbol,
        from: TradeDate,
        to: TradeDate,
        bar_size: BarSize,
    ) -> Result<Self, SourceError> {
        if from > to {
            return Err(SourceError::invalid_request(format!(
                "intraday window start {from} is after end {to}"
            )));
        }
        Ok(Self {
            ticker,
            from,
            to,
            bar_size,
        })
    }
}

/// Bulk "all tickers, one trading day" provider.
pub trait DailyBarSource: Send + Sync {
    fn id(&self) -> &'static str;

    /// Fetches the grouped snapshot for `date`.
    ///
    /// A closed market or a date with no prints is an empty snapshot, not an error.
    fn grouped_daily<'a>(&'a self, date: TradeDate) -> SourceFuture<'a, DailySnapshot>;
}

/// Per-ticker intraday aggregate provider.
pub trait IntradayBarSource: Send + Sync {
    fn id(&self) -> &'static str;

    /// Fetches bars for `request.ticker`, ascending by timestamp.
    fn intraday<'a>(&'a self, request: IntradayRequest) -> SourceFuture<'a, Vec<IntradayBar>>;
}
