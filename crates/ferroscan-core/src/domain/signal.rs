use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Symbol, TradeDate};

/// A `(ticker, date)` that matched at least one pattern rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSignal {
    pub ticker: Symbol,
    pub date: TradeDate,
    pub matched_patterns: BTreeSet<String>,
}

impl CandidateSignal {
    pub fn new(ticker: Symbol, date: TradeDate) -> Self {
        Self {
            ticker,
            date,
            matched_patterns: BTreeSet::new(),
        }
    }

    /// Unions another candidate's matches into this one. Keys must agree.
    pub fn merge(&mut self, other: CandidateSignal) {
        debug_assert_eq!((&self.ticker, self.date), (&other.ticker, other.date));
        self.matched_patterns.extend(other.matched_patterns);
    }
}

/// Trailing pre-market liquidity of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetric {
    pub ticker: Symbol,
    pub date: TradeDate,
    pub trailing_avg_premarket_dollar_volume: f64,
    /// Trading days averaged over, including days with no pre-market prints.
    pub window_days: usize,
    /// Days inside the window that had at least one pre-market print.
    pub premarket_days: usize,
}

/// A candidate that passed liquidity validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedSignal {
    pub ticker: Symbol,
    pub date: TradeDate,
    pub matched_patterns: Vec<String>,
    pub trailing_avg_premarket_dollar_volume: f64,
}

impl ValidatedSignal {
    pub fn from_candidate(candidate: CandidateSignal, metric: &ValidationMetric) -> Self {
        Self {
            ticker: candidate.ticker,
            date: candidate.date,
            matched_patterns: candidate.matched_patterns.into_iter().collect(),
            trailing_avg_premarket_dollar_volume: metric.trailing_avg_premarket_dollar_volume,
        }
    }
}
