//! Run report: what a scan fetched, dropped, and concluded.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fetcher::FetchGap;
use crate::validation::{ItemError, RejectedCandidate};
use crate::TradeDate;

/// Run identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every trading day fetched and every candidate validated.
    Complete,
    /// Results are usable but some inputs were missing.
    Partial,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
        }
    }
}

/// Field order is fixed so that JSON output is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub start: TradeDate,
    pub end: TradeDate,
    pub warmup_start: Option<TradeDate>,
    pub trading_days_requested: usize,
    pub trading_days_fetched: usize,
    pub gaps: Vec<FetchGap>,
    pub empty_days: Vec<TradeDate>,
    pub malformed_bars: usize,
    pub duplicate_bars: usize,
    pub tickers_in_panel: usize,
    pub bulk_requests: usize,
    pub intraday_requests: usize,
    pub candidates_before_validation: usize,
    pub candidates_after_validation: usize,
    pub rejected: Vec<RejectedCandidate>,
    pub validation_errors: Vec<ItemError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn new(start: TradeDate, end: TradeDate) -> Self {
        Self {
            run_id: RunId::new_v4(),
            status: RunStatus::Complete,
            start,
            end,
            warmup_start: None,
            trading_days_requested: 0,
            trading_days_fetched: 0,
            gaps: Vec::new(),
            empty_days: Vec::new(),
            malformed_bars: 0,
            duplicate_bars: 0,
            tickers_in_panel: 0,
            bulk_requests: 0,
            intraday_requests: 0,
            candidates_before_validation: 0,
            candidates_after_validation: 0,
            rejected: Vec::new(),
            validation_errors: Vec::new(),
            notes: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// `Partial` when a trading day or a candidate's intraday data is missing.
    pub fn derive_status(&self) -> RunStatus {
        if self.gaps.is_empty() && self.validation_errors.is_empty() {
            RunStatus::Complete
        } else {
            RunStatus::Partial
        }
    }

    /// Recomputes `status` from the collected bookkeeping.
    pub fn finish(&mut self, elapsed_ms: u64) {
        self.elapsed_ms = elapsed_ms;
        self.status = self.derive_status();
    }

    pub fn is_partial(&self) -> bool {
        self.status == RunStatus::Partial
    }
}
