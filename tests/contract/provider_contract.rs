//! Contract tests for the provider layer.
//!
//! The Polygon client is driven through a recording transport so that URLs,
//! headers, pagination and status mapping can be checked without a network.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferroscan_core::{
    BarSize, BulkHistoryFetcher, CacheMode, CachedDailySource, CircuitBreaker,
    CircuitBreakerConfig, CircuitState, DailyBarSource, FetchConfig, FixtureSource, HttpClient,
    HttpError, HttpRequest, HttpResponse, IntradayBarSource, IntradayRequest, PolygonClient,
    PolygonConfig, ScanConfig, ScanPipeline, ScanRequest, SourceErrorKind, Symbol, TradeDate,
    TradingCalendar,
};

/// Replays canned responses in order and records every request.
#[derive(Default)]
struct RecordingHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingHttpClient {
    fn replying(responses: impl IntoIterator<Item = Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("request log is not poisoned").clone()
    }
}

impl HttpClient for RecordingHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests.lock().expect("request log is not poisoned").push(request);
        let response = self
            .responses
            .lock()
            .expect("response queue is not poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(HttpError::new("no canned response left")));
        Box::pin(async move { response })
    }
}

/// Answers 503 to its first `failures` calls and a one-row snapshot afterwards.
struct FlakyHttpClient {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyHttpClient {
    fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpClient for FlakyHttpClient {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let response = if call < self.failures {
            HttpResponse::with_status(503, "upstream busy")
        } else {
            HttpResponse::ok_json(
                r#"{"status":"OK","resultsCount":1,"results":[
                    {"T":"SMCI","o":40.1,"h":50.2,"l":39.9,"c":48.0,"v":120000000,"t":1739912400000}
                ]}"#,
            )
        };
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(response)
        })
    }
}

fn config() -> PolygonConfig {
    PolygonConfig {
        base_url: String::from("https://polygon.test"),
        ..PolygonConfig::new("secret-key")
    }
}

fn date(value: &str) -> TradeDate {
    TradeDate::parse(value).expect("valid date")
}

// =============================================================================
// Polygon: Grouped Daily
// =============================================================================

#[tokio::test]
async fn grouped_daily_sends_bearer_auth_and_drops_bad_rows_individually() {
    // Given: A grouped response with two good rows and one row missing its close
    let transport = RecordingHttpClient::replying([Ok(HttpResponse::ok_json(
        r#"{"status":"OK","resultsCount":3,"results":[
            {"T":"SMCI","o":40.1,"h":50.2,"l":39.9,"c":48.0,"v":120000000,"vw":45.5,"t":1739912400000},
            {"T":"AAPL","o":244.0,"h":245.5,"l":241.8,"c":244.5,"v":48000000,"t":1739912400000},
            {"T":"BROKEN","o":1.0,"h":2.0,"l":0.5,"v":1000}
        ]}"#,
    ))]);
    let client = PolygonClient::with_http_client(transport.clone(), config());

    // When: The day is fetched
    let snapshot = client
        .grouped_daily(date("2025-02-18"))
        .await
        .expect("snapshot parses");

    // Then: Good rows survive, the bad row is counted, and the key travels as a bearer token
    assert_eq!(snapshot.bars.len(), 2);
    assert_eq!(snapshot.malformed, 1);
    assert!(snapshot.bars.iter().all(|bar| bar.date == date("2025-02-18")));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url,
        "https://polygon.test/v2/aggs/grouped/locale/us/market/stocks/2025-02-18?adjusted=true"
    );
    assert_eq!(
        requests[0].headers.get("authorization").map(String::as_str),
        Some("Bearer secret-key")
    );
    assert!(!requests[0].url.contains("secret-key"));
}

#[tokio::test]
async fn a_closed_market_day_is_an_empty_snapshot() {
    // Given: Polygon answers a holiday with no results field
    let transport = RecordingHttpClient::replying([Ok(HttpResponse::ok_json(
        r#"{"status":"OK","resultsCount":0}"#,
    ))]);
    let client = PolygonClient::with_http_client(transport, config());

    // When: The day is fetched
    let snapshot = client.grouped_daily(date("2025-01-09")).await.expect("ok");

    // Then: The snapshot is empty, not an error
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.malformed, 0);
}

// =============================================================================
// Polygon: Intraday
// =============================================================================

#[tokio::test]
async fn intraday_follows_pagination_and_returns_bars_in_time_order() {
    // Given: Two pages, the second page holding the earlier bar
    let transport = RecordingHttpClient::replying([
        Ok(HttpResponse::ok_json(
            r#"{"results":[{"o":10,"h":11,"l":9.5,"c":10.5,"v":1000,"vw":10.2,"t":1739887200000}],
                "next_url":"https://polygon.test/v2/aggs/ticker/SMCI/range/5/minute/next-page"}"#,
        )),
        Ok(HttpResponse::ok_json(
            r#"{"results":[{"o":9,"h":10,"l":8.5,"c":9.5,"v":500,"t":1739886900000}]}"#,
        )),
    ]);
    let client = PolygonClient::with_http_client(transport.clone(), config());
    let request = IntradayRequest::new(
        Symbol::parse("SMCI").expect("valid"),
        date("2025-02-12"),
        date("2025-02-19"),
        BarSize::minutes(5),
    )
    .expect("valid window");

    // When: The window is fetched
    let bars = client.intraday(request).await.expect("pages parse");

    // Then: Both pages are merged, ascending
    assert_eq!(bars.len(), 2);
    assert!(bars[0].ts < bars[1].ts);
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].url,
        "https://polygon.test/v2/aggs/ticker/SMCI/range/5/minute/next-page"
    );
}

// =============================================================================
// Polygon: Error Mapping
// =============================================================================

#[tokio::test]
async fn throttling_is_retryable_but_authorization_failures_are_not() {
    // Given: A rate-limited answer followed by a forbidden one
    let transport = RecordingHttpClient::replying([
        Ok(HttpResponse::with_status(429, r#"{"status":"ERROR"}"#)),
        Ok(HttpResponse::with_status(403, r#"{"status":"NOT_AUTHORIZED"}"#)),
    ]);
    let client = PolygonClient::with_http_client(transport, config());

    // When: Two days are requested
    let throttled = client.grouped_daily(date("2025-02-18")).await.expect_err("429");
    let forbidden = client.grouped_daily(date("2025-02-19")).await.expect_err("403");

    // Then: Only the 429 invites a retry
    assert_eq!(throttled.kind(), SourceErrorKind::RateLimited);
    assert!(throttled.retryable());
    assert_eq!(forbidden.kind(), SourceErrorKind::InvalidRequest);
    assert!(!forbidden.retryable());
}

#[tokio::test]
async fn unparseable_body_is_a_malformed_error() {
    // Given: A 200 whose body is not JSON
    let transport = RecordingHttpClient::replying([Ok(HttpResponse::ok_json("<html>bad gateway</html>"))]);
    let client = PolygonClient::with_http_client(transport, config());

    // When: The day is fetched
    let error = client.grouped_daily(date("2025-02-18")).await.expect_err("not json");

    // Then: The failure is reported as malformed and not retried
    assert_eq!(error.kind(), SourceErrorKind::Malformed);
    assert!(!error.retryable());
}

#[tokio::test]
async fn repeated_upstream_failures_open_the_circuit() {
    // Given: A breaker that opens after two failures and a transport that keeps failing
    let transport = RecordingHttpClient::replying([
        Ok(HttpResponse::with_status(503, "unavailable")),
        Err(HttpError::timeout("deadline elapsed")),
    ]);
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 2,
        open_timeout: Duration::from_secs(60),
        ..CircuitBreakerConfig::default()
    }));
    let client = PolygonClient::with_http_client(transport.clone(), config())
        .with_circuit_breaker(breaker.clone());

    // When: Three calls are made
    let first = client.grouped_daily(date("2025-02-18")).await.expect_err("503");
    let second = client.grouped_daily(date("2025-02-18")).await.expect_err("timeout");
    let third = client.grouped_daily(date("2025-02-18")).await.expect_err("open circuit");

    // Then: The third call never reaches the transport and says when to come back
    assert_eq!(first.kind(), SourceErrorKind::Unavailable);
    assert_eq!(second.kind(), SourceErrorKind::Timeout);
    assert_eq!(third.kind(), SourceErrorKind::CircuitOpen);
    assert!(third.retry_after().is_some_and(|wait| wait <= Duration::from_secs(60)));
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn a_short_outage_burst_is_waited_out_instead_of_becoming_gaps() {
    // Given: An upstream that fails its first 16 calls and a breaker that opens after 4
    let transport = FlakyHttpClient::failing_first(16);
    let client = Arc::new(PolygonClient::with_http_client(
        transport.clone(),
        PolygonConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 4,
                open_timeout: Duration::from_millis(50),
                trial_wait: Duration::from_millis(10),
            },
            ..config()
        },
    ));
    let fetch = FetchConfig {
        warmup_calendar_days: 30,
        workers: 16,
        max_retries: 2,
        backoff_base_ms: 1,
        backoff_max_ms: 2,
        ..FetchConfig::default()
    };
    let fetcher = BulkHistoryFetcher::new(client, TradingCalendar::us_equities(), fetch);

    // When: June 2025 and its warm-up month are fetched
    let history = fetcher
        .fetch(date("2025-06-02"), date("2025-06-30"))
        .await
        .expect("fetch runs");

    // Then: Every trading day arrives and only real requests reached the provider
    assert!(history.gaps.is_empty(), "gaps: {:?}", history.gaps);
    assert_eq!(history.fetched_days, history.trading_days.len());
    assert_eq!(transport.calls(), history.trading_days.len() + 16);
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn cached_source_serves_overlapping_scans_from_memory() {
    // Given: A fixture wrapped in a snapshot cache
    let fixture = Arc::new(FixtureSource::new());
    let cached: Arc<dyn DailyBarSource> = Arc::new(
        CachedDailySource::new(fixture.clone(), Duration::from_secs(300)).with_mode(CacheMode::Use),
    );
    let mut config = ScanConfig::default();
    config.fetch.warmup_calendar_days = 10;
    let pipeline = ScanPipeline::new(cached, fixture.clone(), config).expect("valid");
    let request = ScanRequest::new(date("2025-02-18"), date("2025-02-19")).expect("valid");

    // When: The same window is scanned twice
    let first = pipeline.run(request.clone()).await.expect("first scan");
    let calls_after_first = fixture.daily_calls();
    let second = pipeline.run(request).await.expect("second scan");

    // Then: The second scan reports the same plan without touching the upstream
    assert_eq!(calls_after_first, first.report.bulk_requests);
    assert_eq!(fixture.daily_calls(), calls_after_first);
    assert_eq!(second.report.bulk_requests, first.report.bulk_requests);
}
