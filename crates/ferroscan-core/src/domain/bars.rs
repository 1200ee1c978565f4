use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Symbol, TradeDate, UtcDateTime, ValidationError};

/// One ticker's OHLCV for one trading day, taken from a grouped snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub ticker: Symbol,
    pub date: TradeDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,
}

impl DailyBar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ticker: Symbol,
        date: TradeDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        vwap: Option<f64>,
    ) -> Result<Self, ValidationError> {
        validate_ohlcv(open, high, low, close, volume, vwap)?;
        Ok(Self {
            ticker,
            date,
            open,
            high,
            low,
            close,
            volume,
            vwap,
        })
    }

    pub fn dollar_volume(&self) -> f64 {
        self.close * self.volume
    }
}

/// Fine-grained bar used only by liquidity validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayBar {
    pub ts: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,
}

impl IntradayBar {
    pub fn new(
        ts: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        vwap: Option<f64>,
    ) -> Result<Self, ValidationError> {
        validate_ohlcv(open, high, low, close, volume, vwap)?;
        Ok(Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
            vwap,
        })
    }

    /// Traded value of the bar, priced at VWAP when the provider reports one.
    pub fn dollar_volume(&self) -> f64 {
        self.volume * self.vwap.unwrap_or(self.close)
    }
}

/// Time unit of an intraday aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarUnit {
    Minute,
    Hour,
}

impl BarUnit {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
        }
    }
}

/// Intraday aggregation width, e.g. 5 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BarSize {
    pub multiplier: u32,
    pub unit: BarUnit,
}

impl BarSize {
    pub const fn minutes(multiplier: u32) -> Self {
        Self {
            multiplier,
            unit: BarUnit::Minute,
        }
    }

    pub const fn hours(multiplier: u32) -> Self {
        Self {
            multiplier,
            unit: BarUnit::Hour,
        }
    }
}

impl Default for BarSize {
    fn default() -> Self {
        Self::minutes(5)
    }
}

impl Display for BarSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let suffix = match self.unit {
            BarUnit::Minute => "m",
            BarUnit::Hour => "h",
        };
        write!(f, "{}{suffix}", self.multiplier)
    }
}

impl FromStr for BarSize {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let invalid = || ValidationError::InvalidBarSize {
            value: value.to_owned(),
        };
        let (digits, unit) = match normalized.strip_suffix('m') {
            Some(digits) => (digits, BarUnit::Minute),
            None => match normalized.strip_suffix('h') {
                Some(digits) => (digits, BarUnit::Hour),
                None => return Err(invalid()),
            },
        };
        let multiplier = digits.parse::<u32>().map_err(|_| invalid())?;
        if multiplier == 0 {
            return Err(invalid());
        }
        Ok(Self { multiplier, unit })
    }
}

impl Serialize for BarSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BarSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

fn validate_ohlcv(
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    vwap: Option<f64>,
) -> Result<(), ValidationError> {
    validate_non_negative("open", open)?;
    validate_non_negative("high", high)?;
    validate_non_negative("low", low)?;
    validate_non_negative("close", close)?;
    validate_non_negative("volume", volume)?;
    if let Some(vwap) = vwap {
        validate_non_negative("vwap", vwap)?;
    }

    if high < low {
        return Err(ValidationError::InvalidBarRange);
    }
    Ok(())
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
