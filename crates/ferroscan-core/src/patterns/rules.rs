//! Standard rule set.
//!
//! Each rule is a conjunction of comparisons over one feature row. A rule
//! computes `Option<bool>` internally so that any undefined input makes the
//! whole rule false.

use crate::features::FeatureRow;
use crate::patterns::params::{ParamSet, ParamSpec};
use crate::patterns::PatternRule;

/// `patternA`: opening gap that extends far beyond the prior close on heavy volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct GapExtension;

const GAP_EXTENSION_PARAMS: &[ParamSpec] = &[
    ParamSpec::number("min_gap_pct", 0.10, "open vs. prior close, as a fraction"),
    ParamSpec::number("min_extension_atr", 3.0, "(high - prior close) / ATR"),
    ParamSpec::number(
        "min_two_day_extension_atr",
        4.0,
        "(high - lowest low of the prior 2 bars) / ATR",
    ),
    ParamSpec::number("min_relative_volume", 3.0, "volume / 20-bar average volume"),
    ParamSpec::number("min_close", 1.0, "minimum close price"),
    ParamSpec::flag("require_green_close", false, "close must be above open"),
];

impl GapExtension {
    fn check(row: &FeatureRow<'_>, params: &ParamSet) -> Option<bool> {
        let two_day = row.lookback(2)?.high_ext_atr?;
        let green = !params.flag("require_green_close")? || row.close > row.open;
        Some(
            row.gap_pct? >= params.number("min_gap_pct")?
                && row.extension_atr? >= params.number("min_extension_atr")?
                && two_day >= params.number("min_two_day_extension_atr")?
                && row.relative_volume? >= params.number("min_relative_volume")?
                && row.close >= params.number("min_close")?
                && green,
        )
    }
}

impl PatternRule for GapExtension {
    fn name(&self) -> &'static str {
        "patternA"
    }

    fn version(&self) -> u32 {
        1
    }

    fn title(&self) -> &'static str {
        "gap extension"
    }

    fn params(&self) -> &'static [ParamSpec] {
        GAP_EXTENSION_PARAMS
    }

    fn required_widths(&self) -> &'static [usize] {
        &[2]
    }

    fn evaluate(&self, row: &FeatureRow<'_>, params: &ParamSet) -> bool {
        Self::check(row, params).unwrap_or(false)
    }
}

/// `patternB`: multi-day run into a fresh high.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiDayRun;

const MULTI_DAY_RUN_PARAMS: &[ParamSpec] = &[
    ParamSpec::number("min_run_atr", 5.0, "(high - lowest low of the prior 3 bars) / ATR"),
    ParamSpec::number("min_change_pct", 0.15, "close vs. prior close, as a fraction"),
    ParamSpec::flag("require_new_high", true, "high must exceed the prior 15-bar high"),
    ParamSpec::number("min_close", 1.0, "minimum close price"),
    ParamSpec::number("min_volume", 500_000.0, "minimum share volume"),
];

impl MultiDayRun {
    fn check(row: &FeatureRow<'_>, params: &ParamSet) -> Option<bool> {
        let run = row.lookback(3)?.high_ext_atr?;
        let new_high = if params.flag("require_new_high")? {
            row.high > row.lookback(15)?.high_max?
        } else {
            true
        };
        Some(
            run >= params.number("min_run_atr")?
                && row.change_pct? >= params.number("min_change_pct")?
                && new_high
                && row.close >= params.number("min_close")?
                && row.volume >= params.number("min_volume")?,
        )
    }
}

impl PatternRule for MultiDayRun {
    fn name(&self) -> &'static str {
        "patternB"
    }

    fn version(&self) -> u32 {
        1
    }

    fn title(&self) -> &'static str {
        "multi-day run to new high"
    }

    fn params(&self) -> &'static [ParamSpec] {
        MULTI_DAY_RUN_PARAMS
    }

    fn required_widths(&self) -> &'static [usize] {
        &[3, 15]
    }

    fn evaluate(&self, row: &FeatureRow<'_>, params: &ParamSet) -> bool {
        Self::check(row, params).unwrap_or(false)
    }
}

/// `patternC`: high stretched far above the fast EMA after a multi-week run.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmaStretch;

const EMA_STRETCH_PARAMS: &[ParamSpec] = &[
    ParamSpec::number("min_ema_stretch_atr", 4.0, "(high - fast EMA) / ATR"),
    ParamSpec::number(
        "min_run_pct",
        0.5,
        "(high - lowest low of the prior 8 bars) / that low",
    ),
    ParamSpec::number("min_dollar_volume", 5_000_000.0, "close * volume"),
    ParamSpec::number("min_close", 1.0, "minimum close price"),
    ParamSpec::flag("require_above_slow_ema", true, "close must be above the slow EMA"),
];

impl EmaStretch {
    fn check(row: &FeatureRow<'_>, params: &ParamSet) -> Option<bool> {
        let run_pct = row.lookback(8)?.run_pct?;
        let above_slow = if params.flag("require_above_slow_ema")? {
            row.close > row.ema_slow?
        } else {
            true
        };
        Some(
            row.ema_fast_stretch_atr? >= params.number("min_ema_stretch_atr")?
                && run_pct >= params.number("min_run_pct")?
                && row.dollar_volume >= params.number("min_dollar_volume")?
                && row.close >= params.number("min_close")?
                && above_slow,
        )
    }
}

impl PatternRule for EmaStretch {
    fn name(&self) -> &'static str {
        "patternC"
    }

    fn version(&self) -> u32 {
        1
    }

    fn title(&self) -> &'static str {
        "EMA stretch"
    }

    fn params(&self) -> &'static [ParamSpec] {
        EMA_STRETCH_PARAMS
    }

    fn required_widths(&self) -> &'static [usize] {
        &[8]
    }

    fn evaluate(&self, row: &FeatureRow<'_>, params: &ParamSet) -> bool {
        Self::check(row, params).unwrap_or(false)
    }
}
