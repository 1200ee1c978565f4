//! Column kernels over one ticker's date-ordered series.
//!
//! Every kernel returns a vector the same length as its input, with `None`
//! at offsets where the lookback is not yet filled.

use std::collections::VecDeque;

/// True range; the first bar has no previous close and uses `high - low`.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..high.len())
        .map(|i| {
            let range = high[i] - low[i];
            if i == 0 {
                return range;
            }
            let prev_close = close[i - 1];
            range
                .max((high[i] - prev_close).abs())
                .max((low[i] - prev_close).abs())
        })
        .collect()
}

/// Wilder ATR. Seeded at offset `period` with the mean of true ranges
/// `1..=period`, then `atr = (prev * (period - 1) + tr) / period`.
pub fn wilder_atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = high.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let tr = true_range(high, low, close);
    let period_f = period as f64;
    let mut atr = tr[1..=period].iter().sum::<f64>() / period_f;
    out[period] = Some(atr);
    for i in (period + 1)..n {
        atr = (atr * (period_f - 1.0) + tr[i]) / period_f;
        out[i] = Some(atr);
    }
    out
}

/// EMA seeded with the simple mean of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut current = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(current);
    for i in period..n {
        current = alpha * values[i] + (1.0 - alpha) * current;
        out[i] = Some(current);
    }
    out
}

/// Mean of the `window` values strictly before each offset.
pub fn trailing_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if window == 0 {
        return out;
    }

    let mut sum = 0.0;
    for i in 0..n {
        if i >= window {
            out[i] = Some(sum / window as f64);
            sum -= values[i - window];
        }
        sum += values[i];
    }
    out
}

/// Maximum of the `width` values strictly before each offset.
pub fn prior_window_max(values: &[f64], width: usize) -> Vec<Option<f64>> {
    shift_forward(rolling_extreme(values, width, |candidate, held| candidate >= held))
}

/// Minimum of the `width` values strictly before each offset.
pub fn prior_window_min(values: &[f64], width: usize) -> Vec<Option<f64>> {
    shift_forward(rolling_extreme(values, width, |candidate, held| candidate <= held))
}

/// Monotonic-deque extreme over the window ending at (and including) each offset.
fn rolling_extreme(values: &[f64], width: usize, dominates: impl Fn(f64, f64) -> bool) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if width == 0 {
        return out;
    }

    let mut deque: VecDeque<usize> = VecDeque::with_capacity(width);
    for i in 0..n {
        while let Some(&back) = deque.back() {
            if dominates(values[i], values[back]) {
                deque.pop_back();
            } else {
                break;
            }
        }
        deque.push_back(i);

        if i + 1 >= width {
            let window_start = i + 1 - width;
            while deque.front().is_some_and(|&front| front < window_start) {
                deque.pop_front();
            }
            out[i] = deque.front().map(|&index| values[index]);
        }
    }
    out
}

fn shift_forward(values: Vec<Option<f64>>) -> Vec<Option<f64>> {
    let mut shifted = Vec::with_capacity(values.len());
    if values.is_empty() {
        return shifted;
    }
    shifted.push(None);
    shifted.extend_from_slice(&values[..values.len() - 1]);
    shifted
}

/// `numerator / denominator`; `None` when the denominator is zero or
/// non-finite, or the quotient overflows or involves a NaN. A zero quotient is defined.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    let value = numerator / denominator;
    value.is_finite().then_some(value)
}
