//! Synthetic market builder shared by the behaviour tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use ferroscan_core::calendar::eastern_offset_hours;
use ferroscan_core::{
    DailyBar, FetchConfig, FixtureSource, IntradayBar, ScanConfig, Symbol, TradeDate,
    TradingCalendar, UtcDateTime, ValidationConfig,
};

pub fn date(value: &str) -> TradeDate {
    TradeDate::parse(value).expect("valid date")
}

pub fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

/// Instant of `hh:mm` US Eastern local time on `day`.
pub fn eastern(day: TradeDate, hour: i64, minute: i64) -> UtcDateTime {
    let noon = UtcDateTime::parse(&format!("{day}T12:00:00Z")).expect("valid instant");
    let offset = eastern_offset_hours(noon);
    let millis = noon.unix_millis() + ((hour - offset - 12) * 60 + minute) * 60_000;
    UtcDateTime::from_unix_millis(millis).expect("in range")
}

/// Daily and intraday bars for a handful of tickers.
#[derive(Default)]
pub struct Market {
    calendar: TradingCalendar,
    daily: Vec<DailyBar>,
    intraday: BTreeMap<Symbol, Vec<IntradayBar>>,
}

impl Market {
    pub fn new() -> Self {
        Self::default()
    }

    /// One quiet bar per trading day in `[from, to]`: close `price`, range +/- 2%.
    pub fn flat(mut self, ticker: &str, from: &str, to: &str, price: f64, volume: f64) -> Self {
        for day in self.calendar.trading_days(date(from), date(to)) {
            self.daily.push(
                DailyBar::new(symbol(ticker), day, price, price * 1.02, price * 0.98, price, volume, None)
                    .expect("valid bar"),
            );
        }
        self
    }

    pub fn bar(mut self, ticker: &str, day: &str, ohlcv: (f64, f64, f64, f64, f64)) -> Self {
        let (open, high, low, close, volume) = ohlcv;
        self.daily.push(
            DailyBar::new(symbol(ticker), date(day), open, high, low, close, volume, None)
                .expect("valid bar"),
        );
        self
    }

    /// The breakaway session from a 5.00 base: gap to 6.00, high 9.00, close 8.50 on 20M shares.
    pub fn spike(self, ticker: &str, day: &str) -> Self {
        self.bar(ticker, day, (6.0, 9.0, 5.9, 8.5, 20_000_000.0))
    }

    /// One 08:00 ET bar worth `dollar_value` on `day`.
    pub fn premarket(mut self, ticker: &str, day: &str, dollar_value: f64) -> Self {
        let price = 10.0;
        let bar = IntradayBar::new(eastern(date(day), 8, 0), price, price, price, price, dollar_value / price, None)
            .expect("valid bar");
        self.intraday.entry(symbol(ticker)).or_default().push(bar);
        self
    }

    /// A regular-session bar at `hh:mm` ET.
    pub fn regular(mut self, ticker: &str, day: &str, at: (i64, i64), open: f64, close: f64) -> Self {
        let bar = IntradayBar::new(
            eastern(date(day), at.0, at.1),
            open,
            open.max(close),
            open.min(close),
            close,
            10_000.0,
            None,
        )
        .expect("valid bar");
        self.intraday.entry(symbol(ticker)).or_default().push(bar);
        self
    }

    pub fn build(self) -> FixtureSource {
        let mut source = FixtureSource::new().with_daily(self.daily);
        for (ticker, bars) in self.intraday {
            source = source.with_intraday(ticker, bars);
        }
        source
    }
}

/// `RUNR` breaks out on 2025-02-18 with 12M average pre-market value,
/// `THIN` breaks out the same day with almost no pre-market trading, and
/// `FLAT` never moves.
pub fn breakout_market() -> Market {
    Market::new()
        .flat("RUNR", "2024-08-01", "2025-02-14", 5.0, 1_000_000.0)
        .spike("RUNR", "2025-02-18")
        .flat("RUNR", "2025-02-19", "2025-02-21", 8.5, 5_000_000.0)
        .premarket("RUNR", "2025-02-18", 60_000_000.0)
        .flat("THIN", "2024-08-01", "2025-02-14", 5.0, 1_000_000.0)
        .spike("THIN", "2025-02-18")
        .premarket("THIN", "2025-02-18", 1_000_000.0)
        .flat("FLAT", "2024-08-01", "2025-02-21", 10.0, 2_000_000.0)
}

/// Default parameters with retries shortened for tests.
pub fn fast_config() -> ScanConfig {
    ScanConfig {
        fetch: FetchConfig {
            workers: 8,
            max_retries: 1,
            backoff_base_ms: 1,
            backoff_max_ms: 1,
            ..FetchConfig::default()
        },
        validation: ValidationConfig {
            max_retries: 1,
            backoff_base_ms: 1,
            backoff_max_ms: 1,
            ..ValidationConfig::default()
        },
        ..ScanConfig::default()
    }
}
