//! # Ferroscan Core
//!
//! Market-wide technical pattern scanner for US equities.
//!
//! ## Overview
//!
//! A scan runs four stages over a date window:
//!
//! - **Bulk history fetch**: one grouped daily snapshot per trading day
//!   (plus a warm-up period), fetched by a bounded worker pool
//! - **Feature engine**: per-ticker indicator columns (ATR, EMAs, volume
//!   averages, lookback extremes) built in parallel
//! - **Pattern engine**: named, parameterised rules evaluated per row
//! - **Validation engine**: trailing pre-market dollar-volume screen using
//!   one intraday request per candidate
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`calendar`] | Trading days, holidays and the Eastern session clock |
//! | [`circuit_breaker`] | Circuit breaker for upstream calls |
//! | [`domain`] | Symbols, dates, bars and signals |
//! | [`error`] | Validation and run-level errors |
//! | [`features`] | Feature engine and column kernels |
//! | [`fetcher`] | Bulk history fetcher |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`patterns`] | Rule trait, catalogue and pattern engine |
//! | [`pipeline`] | Scan configuration and orchestration |
//! | [`pool`] | Bounded worker pool |
//! | [`report`] | Run report |
//! | [`retry`] | Backoff and per-task retry |
//! | [`source`] | Provider traits, Polygon client, fixtures, caching |
//! | [`throttle`] | Request-rate throttle |
//! | [`validation`] | Intraday liquidity validation |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferroscan_core::{PolygonClient, PolygonConfig, ScanConfig, ScanPipeline, ScanRequest, TradeDate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(PolygonClient::new(PolygonConfig::from_env()?));
//!     let pipeline = ScanPipeline::new(client.clone(), client, ScanConfig::default())?;
//!
//!     let request = ScanRequest::new(TradeDate::parse("2025-01-02")?, TradeDate::parse("2025-01-31")?)?;
//!     let outcome = pipeline.run(request).await?;
//!     for signal in &outcome.signals {
//!         println!("{} {} {:?}", signal.date, signal.ticker, signal.matched_patterns);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! A run either fails with [`ScanError`] (it did not run) or returns a
//! [`ScanOutcome`] whose report status is `complete` or `partial`. Provider
//! failures are [`SourceError`]s with a stable `code()`:
//!
//! ```rust
//! use ferroscan_core::{SourceError, SourceErrorKind};
//!
//! fn should_back_off(error: &SourceError) -> bool {
//!     matches!(error.kind(), SourceErrorKind::RateLimited | SourceErrorKind::Timeout)
//! }
//! ```
//!
//! ## Security
//!
//! - The provider key is read from the environment and never logged

pub mod calendar;
pub mod circuit_breaker;
pub mod domain;
pub mod error;
pub mod features;
pub mod fetcher;
pub mod http_client;
pub mod patterns;
pub mod pipeline;
pub mod pool;
pub mod report;
pub mod retry;
pub mod source;
pub mod throttle;
pub mod validation;

// Calendar
pub use calendar::{session_of, Session, TradingCalendar};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Domain models
pub use domain::{
    BarSize, BarUnit, CandidateSignal, DailyBar, IntradayBar, Symbol, TradeDate, UtcDateTime,
    ValidatedSignal, ValidationMetric,
};

// Error types
pub use error::{ScanError, ValidationError};

// Engines
pub use features::{FeatureConfig, FeatureEngine, FeaturePanel, FeatureRow};
pub use fetcher::{BulkHistoryFetcher, FetchConfig, FetchGap, FetchedHistory};
pub use patterns::{
    ParamSet, ParamSpec, PatternCatalogue, PatternEngine, PatternRule, RawParams, ResolvedCatalogue,
    RuleInfo,
};
pub use validation::{
    ItemError, RejectedCandidate, RejectionReason, ValidationConfig, ValidationEngine,
    ValidationOutcome,
};

// HTTP client types
pub use http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Orchestration
pub use pipeline::{PatternConfig, ScanConfig, ScanOutcome, ScanPipeline, ScanRequest};
pub use report::{RunId, RunReport, RunStatus};

// Worker pool, retry and throttling
pub use pool::WorkerPool;
pub use retry::{Backoff, RetryConfig, TaskFailure};
pub use throttle::RequestThrottle;

// Sources
pub use source::{
    CacheMode, CachedDailySource, DailyBarSource, DailySnapshot, FixtureData, FixtureSource,
    IntradayBarSource, IntradayRequest, PolygonClient, PolygonConfig, SourceError, SourceErrorKind,
};
