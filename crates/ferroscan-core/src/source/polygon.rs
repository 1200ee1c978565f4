use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::source::{
    DailyBarSource, DailySnapshot, IntradayBarSource, IntradayRequest, SourceError, SourceFuture,
};
use crate::{DailyBar, IntradayBar, Symbol, TradeDate, UtcDateTime, ValidationError};

const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
const INTRADAY_PAGE_LIMIT: u32 = 50_000;

/// Connection settings for the Polygon aggregates API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolygonConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
    /// Upper bound on `next_url` pages followed for one intraday request.
    pub max_pages: usize,
    /// Shared by every worker of a scan; one breaker per client.
    pub circuit_breaker: CircuitBreakerConfig,
}

impl PolygonConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: String::from(DEFAULT_BASE_URL),
            api_key: api_key.into(),
            request_timeout_ms: 15_000,
            max_pages: 20,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    /// Reads `FERROSCAN_POLYGON_API_KEY` (falling back to `POLYGON_API_KEY`)
    /// and an optional `FERROSCAN_POLYGON_BASE_URL`.
    pub fn from_env() -> Result<Self, ValidationError> {
        let api_key = std::env::var("FERROSCAN_POLYGON_API_KEY")
            .or_else(|_| std::env::var("POLYGON_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ValidationError::InvalidConfig {
                field: "polygon.api_key",
                reason: String::from(
                    "set FERROSCAN_POLYGON_API_KEY or POLYGON_API_KEY, or pass --fixture",
                ),
            })?;

        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("FERROSCAN_POLYGON_BASE_URL") {
            if !base_url.trim().is_empty() {
                config.base_url = base_url.trim_end_matches('/').to_owned();
            }
        }
        Ok(config)
    }
}

/// Polygon.io client serving both grouped daily and intraday aggregates.
#[derive(Clone)]
pub struct PolygonClient {
    http_client: Arc<dyn HttpClient>,
    config: PolygonConfig,
    auth: HttpAuth,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl PolygonClient {
    pub fn new(config: PolygonConfig) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), config)
    }

    pub fn with_http_client(http_client: Arc<dyn HttpClient>, config: PolygonConfig) -> Self {
        let auth = HttpAuth::BearerToken(config.api_key.clone());
        let circuit_breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker));
        Self {
            http_client,
            config,
            auth,
            circuit_breaker,
        }
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn grouped_daily_url(&self, date: TradeDate) -> String {
        format!(
            "{}/v2/aggs/grouped/locale/us/market/stocks/{date}?adjusted=true",
            self.config.base_url
        )
    }

    pub fn intraday_url(&self, request: &IntradayRequest) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}?adjusted=true&sort=asc&limit={INTRADAY_PAGE_LIMIT}",
            self.config.base_url,
            urlencoding::encode(request.ticker.as_str()),
            request.bar_size.multiplier,
            request.bar_size.unit.as_str(),
            request.from,
            request.to,
        )
    }

    async fn get(&self, url: &str) -> Result<HttpResponse, SourceError> {
        if let Err(wait) = self.circuit_breaker.try_acquire() {
            return Err(SourceError::circuit_open(
                format!("polygon circuit is open; next trial call in {} ms", wait.as_millis()),
                wait,
            ));
        }

        let request = HttpRequest::get(url)
            .with_auth(&self.auth)
            .with_timeout_ms(self.config.request_timeout_ms);

        let response = self.http_client.execute(request).await.map_err(|error| {
            self.circuit_breaker.record_failure();
            transport_error(&error)
        })?;

        if response.is_success() {
            self.circuit_breaker.record_success();
            return Ok(response);
        }

        let error = status_error(response.status, &response.body);
        if error.retryable() {
            self.circuit_breaker.record_failure();
        } else {
            // A definitive 4xx still proves the upstream is answering.
            self.circuit_breaker.record_success();
        }
        Err(error)
    }

    async fn fetch_grouped(&self, date: TradeDate) -> Result<DailySnapshot, SourceError> {
        let response = self.get(&self.grouped_daily_url(date)).await?;
        let envelope: AggregatesEnvelope = serde_json::from_str(&response.body).map_err(|e| {
            SourceError::malformed(format!("failed to parse grouped daily for {date}: {e}"))
        })?;

        let rows = envelope.results.unwrap_or_default();
        let mut bars = Vec::with_capacity(rows.len());
        let mut malformed = 0;
        for row in rows {
            match parse_daily_row(row, date) {
                Some(bar) => bars.push(bar),
                None => malformed += 1,
            }
        }
        if malformed > 0 {
            tracing::debug!(%date, malformed, "dropped malformed grouped rows");
        }
        Ok(DailySnapshot::new(date, bars, malformed))
    }

    async fn fetch_intraday(&self, request: IntradayRequest) -> Result<Vec<IntradayBar>, SourceError> {
        let mut url = self.intraday_url(&request);
        let mut bars = Vec::new();
        let mut malformed = 0_usize;

        for _ in 0..self.config.max_pages.max(1) {
            let response = self.get(&url).await?;
            let envelope: AggregatesEnvelope =
                serde_json::from_str(&response.body).map_err(|e| {
                    SourceError::malformed(format!(
                        "failed to parse intraday aggregates for {}: {e}",
                        request.ticker
                    ))
                })?;

            for row in envelope.results.unwrap_or_default() {
                match parse_intraday_row(row) {
                    Some(bar) => bars.push(bar),
                    None => malformed += 1,
                }
            }

            match envelope.next_url {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        if malformed > 0 {
            tracing::debug!(ticker = %request.ticker, malformed, "dropped malformed intraday rows");
        }
        bars.sort_by_key(|bar| bar.ts);
        Ok(bars)
    }
}

impl DailyBarSource for PolygonClient {
    fn id(&self) -> &'static str {
        "polygon"
    }

    fn grouped_daily<'a>(&'a self, date: TradeDate) -> SourceFuture<'a, DailySnapshot> {
        Box::pin(self.fetch_grouped(date))
    }
}

impl IntradayBarSource for PolygonClient {
    fn id(&self) -> &'static str {
        "polygon"
    }

    fn intraday<'a>(&'a self, request: IntradayRequest) -> SourceFuture<'a, Vec<IntradayBar>> {
        Box::pin(self.fetch_intraday(request))
    }
}

#[derive(Debug, Deserialize)]
struct AggregatesEnvelope {
    #[serde(default)]
    results: Option<Vec<Value>>,
    #[serde(default)]
    next_url: Option<String>,
}

/// One aggregate row; every field optional so a bad row is isolated.
#[derive(Debug, Deserialize)]
struct RawAggregate {
    #[serde(rename = "T")]
    ticker: Option<String>,
    o: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    c: Option<f64>,
    v: Option<f64>,
    vw: Option<f64>,
    t: Option<i64>,
}

fn parse_daily_row(row: Value, date: TradeDate) -> Option<DailyBar> {
    let raw: RawAggregate = serde_json::from_value(row).ok()?;
    let ticker = Symbol::parse(raw.ticker.as_deref()?).ok()?;
    DailyBar::new(ticker, date, raw.o?, raw.h?, raw.l?, raw.c?, raw.v?, raw.vw).ok()
}

fn parse_intraday_row(row: Value) -> Option<IntradayBar> {
    let raw: RawAggregate = serde_json::from_value(row).ok()?;
    let ts = UtcDateTime::from_unix_millis(raw.t?).ok()?;
    IntradayBar::new(ts, raw.o?, raw.h?, raw.l?, raw.c?, raw.v?, raw.vw).ok()
}

fn transport_error(error: &HttpError) -> SourceError {
    if error.is_timeout() {
        SourceError::timeout(format!("polygon request timed out: {}", error.message()))
    } else {
        SourceError::unavailable(format!("polygon transport error: {}", error.message()))
    }
}

/// Maps a non-2xx status to a source error; only 408, 429 and 5xx are retryable.
fn status_error(status: u16, body: &str) -> SourceError {
    let detail: String = body.chars().take(200).collect();
    match status {
        429 => SourceError::rate_limited(format!("polygon rate limit hit (429): {detail}")),
        408 => SourceError::timeout(format!("polygon returned 408: {detail}")),
        500..=599 => SourceError::unavailable(format!("polygon returned {status}: {detail}")),
        _ => SourceError::invalid_request(format!("polygon returned {status}: {detail}")),
    }
}
