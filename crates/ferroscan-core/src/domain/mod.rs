//! # Domain Models
//!
//! Canonical types shared by every pipeline stage.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated ticker |
//! | [`TradeDate`] | Session date, `YYYY-MM-DD` on the wire |
//! | [`UtcDateTime`] | Intraday bar instant |
//! | [`DailyBar`] | One ticker's OHLCV for one day |
//! | [`IntradayBar`] | Fine-grained bar for liquidity checks |
//! | [`CandidateSignal`] | Pattern match awaiting validation |
//! | [`ValidatedSignal`] | Pipeline output unit |
//!
//! Bars validate finiteness, non-negativity and `high >= low` at construction;
//! provider rows that fail are discarded by the adapter, never repaired.

mod bars;
mod signal;
mod symbol;
mod timestamp;
mod trade_date;

pub use bars::{BarSize, BarUnit, DailyBar, IntradayBar};
pub use signal::{CandidateSignal, ValidatedSignal, ValidationMetric};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
pub use trade_date::TradeDate;
