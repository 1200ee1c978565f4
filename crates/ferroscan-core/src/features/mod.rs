//! Feature engine: per-ticker indicator panel.
//!
//! Bars are partitioned by ticker and every ticker's columns are computed
//! independently (in parallel with rayon). Each ticker owns a column arena
//! indexed by trading-day offset; nothing is shared or mutated across
//! tickers, and the panel is read-only once built.
//!
//! | Column | Definition |
//! |--------|------------|
//! | `atr` | Wilder ATR over `atr_period` |
//! | `ema_fast` / `ema_slow` | EMA of close, SMA-seeded |
//! | `avg_volume` | mean volume of the `volume_window` prior bars |
//! | `gap_pct` | `(open - prev_close) / prev_close` |
//! | `change_pct` | `(close - prev_close) / prev_close` |
//! | `extension_atr` | `(high - prev_close) / atr` |
//! | `relative_volume` | `volume / avg_volume` |
//! | `range_atr` | `(high - low) / atr` |
//! | `ema_fast_stretch_atr` | `(high - ema_fast) / atr` |
//!
//! Per lookback width `k` (prior `k` bars, current bar excluded):
//! `high_max`, `low_min`, `high_ext_atr = (high - low_min) / atr`,
//! `low_ext_atr = (high_max - low) / atr`, `run_pct = (high - low_min) / low_min`,
//! `breakout_pct = (close - high_max) / high_max`.
//!
//! Percentages are fractions (0.05 = 5%).

pub mod kernels;

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{DailyBar, Symbol, TradeDate, ValidationError};
use kernels::ratio;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureConfig {
    pub atr_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub volume_window: usize,
    pub lookback_widths: Vec<usize>,
    /// Prior bars a row needs before it is `defined`.
    pub min_history: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            ema_fast: 9,
            ema_slow: 20,
            volume_window: 20,
            lookback_widths: vec![2, 3, 8, 15],
            min_history: 20,
        }
    }
}

impl FeatureConfig {
    /// Smallest `min_history` at which every column of a defined row has its
    /// lookback filled.
    pub fn required_history(&self) -> usize {
        let widest = self.lookback_widths.iter().copied().max().unwrap_or(0);
        [
            1,
            self.atr_period,
            self.ema_fast.saturating_sub(1),
            self.ema_slow.saturating_sub(1),
            self.volume_window,
            widest,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("features.atr_period", self.atr_period),
            ("features.ema_fast", self.ema_fast),
            ("features.ema_slow", self.ema_slow),
            ("features.volume_window", self.volume_window),
        ] {
            if value == 0 {
                return Err(ValidationError::InvalidConfig {
                    field,
                    reason: String::from("must be at least 1"),
                });
            }
        }
        if self.lookback_widths.contains(&0) {
            return Err(ValidationError::InvalidConfig {
                field: "features.lookback_widths",
                reason: String::from("widths must be at least 1"),
            });
        }
        let required = self.required_history();
        if self.min_history < required {
            return Err(ValidationError::InvalidConfig {
                field: "features.min_history",
                reason: format!("must be at least {required} for the configured windows"),
            });
        }
        Ok(())
    }

    /// Distinct widths, ascending.
    pub fn widths(&self) -> Vec<usize> {
        let mut widths = self.lookback_widths.clone();
        widths.sort_unstable();
        widths.dedup();
        widths
    }
}

/// Lookback-width features of one row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LookbackFeatures {
    pub width: usize,
    pub high_max: Option<f64>,
    pub low_min: Option<f64>,
    pub high_ext_atr: Option<f64>,
    pub low_ext_atr: Option<f64>,
    pub run_pct: Option<f64>,
    pub breakout_pct: Option<f64>,
}

/// Borrowed view of one ticker-day in the panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRow<'a> {
    pub ticker: &'a Symbol,
    pub date: TradeDate,
    /// False until the ticker has `min_history` prior bars.
    pub defined: bool,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub dollar_volume: f64,
    pub prev_close: Option<f64>,
    pub prev_high: Option<f64>,
    pub prev_low: Option<f64>,
    pub atr: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub avg_volume: Option<f64>,
    pub gap_pct: Option<f64>,
    pub change_pct: Option<f64>,
    pub extension_atr: Option<f64>,
    pub relative_volume: Option<f64>,
    pub range_atr: Option<f64>,
    pub ema_fast_stretch_atr: Option<f64>,
    pub lookbacks: &'a [LookbackFeatures],
}

impl FeatureRow<'_> {
    pub fn lookback(&self, width: usize) -> Option<&LookbackFeatures> {
        self.lookbacks.iter().find(|lookback| lookback.width == width)
    }
}

/// Column arena for one ticker, indexed by trading-day offset.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSeries {
    ticker: Symbol,
    min_history: usize,
    dates: Vec<TradeDate>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
    atr: Vec<Option<f64>>,
    ema_fast: Vec<Option<f64>>,
    ema_slow: Vec<Option<f64>>,
    avg_volume: Vec<Option<f64>>,
    gap_pct: Vec<Option<f64>>,
    change_pct: Vec<Option<f64>>,
    extension_atr: Vec<Option<f64>>,
    relative_volume: Vec<Option<f64>>,
    range_atr: Vec<Option<f64>>,
    ema_fast_stretch_atr: Vec<Option<f64>>,
    /// Row-major: `lookbacks[i * widths + w]`.
    lookbacks: Vec<LookbackFeatures>,
    width_count: usize,
}

impl TickerSeries {
    fn build(ticker: Symbol, bars: &[&DailyBar], config: &FeatureConfig, widths: &[usize]) -> Self {
        let n = bars.len();
        let dates: Vec<TradeDate> = bars.iter().map(|bar| bar.date).collect();
        let open: Vec<f64> = bars.iter().map(|bar| bar.open).collect();
        let high: Vec<f64> = bars.iter().map(|bar| bar.high).collect();
        let low: Vec<f64> = bars.iter().map(|bar| bar.low).collect();
        let close: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        let volume: Vec<f64> = bars.iter().map(|bar| bar.volume).collect();

        let atr = kernels::wilder_atr(&high, &low, &close, config.atr_period);
        let ema_fast = kernels::ema(&close, config.ema_fast);
        let ema_slow = kernels::ema(&close, config.ema_slow);
        let avg_volume = kernels::trailing_mean(&volume, config.volume_window);

        let prev = |column: &[f64], i: usize| (i > 0).then(|| column[i - 1]);
        let mut gap_pct = Vec::with_capacity(n);
        let mut change_pct = Vec::with_capacity(n);
        let mut extension_atr = Vec::with_capacity(n);
        let mut relative_volume = Vec::with_capacity(n);
        let mut range_atr = Vec::with_capacity(n);
        let mut ema_fast_stretch_atr = Vec::with_capacity(n);
        for i in 0..n {
            let prev_close = prev(&close, i);
            gap_pct.push(prev_close.and_then(|pc| ratio(open[i] - pc, pc)));
            change_pct.push(prev_close.and_then(|pc| ratio(close[i] - pc, pc)));
            extension_atr.push(prev_close.zip(atr[i]).and_then(|(pc, a)| ratio(high[i] - pc, a)));
            relative_volume.push(avg_volume[i].and_then(|avg| ratio(volume[i], avg)));
            range_atr.push(atr[i].and_then(|a| ratio(high[i] - low[i], a)));
            ema_fast_stretch_atr.push(ema_fast[i].zip(atr[i]).and_then(|(e, a)| ratio(high[i] - e, a)));
        }

        let extremes: Vec<(usize, Vec<Option<f64>>, Vec<Option<f64>>)> = widths
            .iter()
            .map(|&width| {
                (
                    width,
                    kernels::prior_window_max(&high, width),
                    kernels::prior_window_min(&low, width),
                )
            })
            .collect();
        let mut lookbacks = Vec::with_capacity(n * widths.len());
        for i in 0..n {
            for (width, maxes, mins) in &extremes {
                let high_max = maxes[i];
                let low_min = mins[i];
                lookbacks.push(LookbackFeatures {
                    width: *width,
                    high_max,
                    low_min,
                    high_ext_atr: low_min.zip(atr[i]).and_then(|(m, a)| ratio(high[i] - m, a)),
                    low_ext_atr: high_max.zip(atr[i]).and_then(|(m, a)| ratio(m - low[i], a)),
                    run_pct: low_min.and_then(|m| ratio(high[i] - m, m)),
                    breakout_pct: high_max.and_then(|m| ratio(close[i] - m, m)),
                });
            }
        }

        Self {
            ticker,
            min_history: config.min_history,
            dates,
            open,
            high,
            low,
            close,
            volume,
            atr,
            ema_fast,
            ema_slow,
            avg_volume,
            gap_pct,
            change_pct,
            extension_atr,
            relative_volume,
            range_atr,
            ema_fast_stretch_atr,
            lookbacks,
            width_count: widths.len(),
        }
    }

    pub fn ticker(&self) -> &Symbol {
        &self.ticker
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[TradeDate] {
        &self.dates
    }

    pub fn index_of(&self, date: TradeDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Row at offset `i`. Panics when `i >= len()`.
    pub fn row(&self, i: usize) -> FeatureRow<'_> {
        let prev = |column: &[f64]| (i > 0).then(|| column[i - 1]);
        FeatureRow {
            ticker: &self.ticker,
            date: self.dates[i],
            defined: i >= self.min_history,
            open: self.open[i],
            high: self.high[i],
            low: self.low[i],
            close: self.close[i],
            volume: self.volume[i],
            dollar_volume: self.close[i] * self.volume[i],
            prev_close: prev(&self.close),
            prev_high: prev(&self.high),
            prev_low: prev(&self.low),
            atr: self.atr[i],
            ema_fast: self.ema_fast[i],
            ema_slow: self.ema_slow[i],
            avg_volume: self.avg_volume[i],
            gap_pct: self.gap_pct[i],
            change_pct: self.change_pct[i],
            extension_atr: self.extension_atr[i],
            relative_volume: self.relative_volume[i],
            range_atr: self.range_atr[i],
            ema_fast_stretch_atr: self.ema_fast_stretch_atr[i],
            lookbacks: &self.lookbacks[i * self.width_count..(i + 1) * self.width_count],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = FeatureRow<'_>> + '_ {
        (0..self.len()).map(move |i| self.row(i))
    }

    /// Rows whose date lies in `[start, end]`.
    pub fn rows_between(&self, start: TradeDate, end: TradeDate) -> impl Iterator<Item = FeatureRow<'_>> + '_ {
        let from = self.dates.partition_point(|date| *date < start);
        let to = self.dates.partition_point(|date| *date <= end);
        (from..to.max(from)).map(move |i| self.row(i))
    }
}

/// Read-only per-ticker indicator panel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeaturePanel {
    series: BTreeMap<Symbol, TickerSeries>,
    widths: Vec<usize>,
    duplicate_bars: usize,
}

impl FeaturePanel {
    pub fn get(&self, ticker: &Symbol) -> Option<&TickerSeries> {
        self.series.get(ticker)
    }

    pub fn series(&self) -> impl Iterator<Item = &TickerSeries> {
        self.series.values()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &Symbol> {
        self.series.keys()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Lookback widths materialised for every row.
    pub fn widths(&self) -> &[usize] {
        &self.widths
    }

    /// Bars dropped because their `(ticker, date)` had already been seen.
    pub const fn duplicate_bars(&self) -> usize {
        self.duplicate_bars
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureEngine {
    config: FeatureConfig,
}

impl FeatureEngine {
    pub fn new(config: FeatureConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Builds the panel. Input order does not matter beyond duplicate
    /// resolution: for a repeated `(ticker, date)` the earlier bar wins.
    pub fn build(&self, bars: &[DailyBar]) -> FeaturePanel {
        let mut groups: BTreeMap<&Symbol, Vec<&DailyBar>> = BTreeMap::new();
        for bar in bars {
            groups.entry(&bar.ticker).or_default().push(bar);
        }

        let mut duplicate_bars = 0;
        let groups: Vec<(Symbol, Vec<&DailyBar>)> = groups
            .into_iter()
            .map(|(ticker, mut rows)| {
                rows.sort_by_key(|bar| bar.date);
                let before = rows.len();
                rows.dedup_by_key(|bar| bar.date);
                duplicate_bars += before - rows.len();
                (ticker.clone(), rows)
            })
            .collect();

        let widths = self.config.widths();
        let series: Vec<(Symbol, TickerSeries)> = groups
            .into_par_iter()
            .map(|(ticker, rows)| {
                let series = TickerSeries::build(ticker.clone(), &rows, &self.config, &widths);
                (ticker, series)
            })
            .collect();

        if duplicate_bars > 0 {
            tracing::warn!(duplicate_bars, "dropped duplicate (ticker, date) bars");
        }
        tracing::info!(tickers = series.len(), bars = bars.len(), "feature panel built");

        FeaturePanel {
            series: series.into_iter().collect(),
            widths,
            duplicate_bars,
        }
    }
}
