//! Pattern engine: a catalogue of named rules evaluated over feature rows.

mod params;
mod rules;

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::features::{FeaturePanel, FeatureRow};
use crate::{CandidateSignal, Symbol, TradeDate, ValidationError};

pub use params::{ParamKind, ParamSet, ParamSpec, ParamValue, RawParams, VERSION_KEY};
pub use rules::{EmaStretch, GapExtension, MultiDayRun};

/// One named, versioned predicate over a single feature row.
///
/// Rules must be pure: the same row and parameters always produce the same
/// answer, and any undefined input must yield `false`.
pub trait PatternRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Short human-readable label.
    fn title(&self) -> &'static str;

    fn params(&self) -> &'static [ParamSpec];

    /// Lookback widths the rule reads from `FeatureRow::lookbacks`.
    fn required_widths(&self) -> &'static [usize];

    fn evaluate(&self, row: &FeatureRow<'_>, params: &ParamSet) -> bool;
}

/// Registered rules, in registration order.
#[derive(Clone, Default)]
pub struct PatternCatalogue {
    rules: Vec<Arc<dyn PatternRule>>,
}

impl std::fmt::Debug for PatternCatalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternCatalogue")
            .field("rules", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl PatternCatalogue {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `patternA`, `patternB` and `patternC`.
    pub fn standard() -> Self {
        let mut catalogue = Self::empty();
        let rules: [Arc<dyn PatternRule>; 3] = [
            Arc::new(GapExtension),
            Arc::new(MultiDayRun),
            Arc::new(EmaStretch),
        ];
        for rule in rules {
            catalogue.rules.push(rule);
        }
        catalogue
    }

    pub fn register(&mut self, rule: Arc<dyn PatternRule>) -> Result<(), ValidationError> {
        if self.get(rule.name()).is_some() {
            return Err(ValidationError::InvalidConfig {
                field: "patterns",
                reason: format!("rule '{}' is already registered", rule.name()),
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PatternRule>> {
        self.rules.iter().find(|rule| rule.name() == name)
    }

    pub fn rules(&self) -> &[Arc<dyn PatternRule>] {
        &self.rules
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|rule| rule.name())
    }

    /// Binds parameters to the selected rules.
    ///
    /// `selected` empty means every registered rule. Overrides for a rule
    /// that exists but is not selected are still validated.
    pub fn resolve(
        &self,
        overrides: &BTreeMap<String, RawParams>,
        selected: &[String],
        widths: &[usize],
    ) -> Result<ResolvedCatalogue, ValidationError> {
        for name in overrides.keys().chain(selected) {
            if self.get(name).is_none() {
                return Err(ValidationError::UnknownPattern { name: name.clone() });
            }
        }

        let mut resolved = Vec::new();
        for rule in &self.rules {
            let params = ParamSet::resolve(
                rule.name(),
                rule.version(),
                rule.params(),
                overrides.get(rule.name()),
            )?;
            if !selected.is_empty() && !selected.iter().any(|name| name == rule.name()) {
                continue;
            }
            if let Some(&width) = rule
                .required_widths()
                .iter()
                .find(|width| !widths.contains(width))
            {
                return Err(ValidationError::MissingLookbackWidth {
                    pattern: rule.name().to_owned(),
                    width,
                });
            }
            resolved.push(ResolvedRule {
                rule: Arc::clone(rule),
                params,
            });
        }

        if resolved.is_empty() {
            return Err(ValidationError::EmptyCatalogue);
        }
        Ok(ResolvedCatalogue { rules: resolved })
    }
}

/// A rule with its parameters bound.
#[derive(Clone)]
pub struct ResolvedRule {
    pub rule: Arc<dyn PatternRule>,
    pub params: ParamSet,
}

impl std::fmt::Debug for ResolvedRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedRule")
            .field("rule", &self.rule.name())
            .field("params", &self.params)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedCatalogue {
    rules: Vec<ResolvedRule>,
}

impl ResolvedCatalogue {
    pub fn rules(&self) -> &[ResolvedRule] {
        &self.rules
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|resolved| resolved.rule.name()).collect()
    }

    fn matches(&self, row: &FeatureRow<'_>) -> Option<CandidateSignal> {
        let mut candidate = CandidateSignal::new(row.ticker.clone(), row.date);
        for resolved in &self.rules {
            if resolved.rule.evaluate(row, &resolved.params) {
                candidate
                    .matched_patterns
                    .insert(resolved.rule.name().to_owned());
            }
        }
        (!candidate.matched_patterns.is_empty()).then_some(candidate)
    }
}

/// Description of a rule for listings.
#[derive(Debug, Clone, Serialize)]
pub struct RuleInfo {
    pub name: &'static str,
    pub version: u32,
    pub title: &'static str,
    pub lookback_widths: &'static [usize],
    pub params: &'static [ParamSpec],
}

impl RuleInfo {
    pub fn of(rule: &dyn PatternRule) -> Self {
        Self {
            name: rule.name(),
            version: rule.version(),
            title: rule.title(),
            lookback_widths: rule.required_widths(),
            params: rule.params(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternEngine;

impl PatternEngine {
    /// Evaluates every defined row dated in `[start, end]`.
    ///
    /// Output holds at most one candidate per `(ticker, date)`, sorted by date
    /// then ticker.
    pub fn evaluate(
        &self,
        panel: &FeaturePanel,
        catalogue: &ResolvedCatalogue,
        start: TradeDate,
        end: TradeDate,
    ) -> Vec<CandidateSignal> {
        let series: Vec<_> = panel.series().collect();
        let per_ticker: Vec<Vec<CandidateSignal>> = series
            .into_par_iter()
            .map(|series| {
                series
                    .rows_between(start, end)
                    .filter(|row| row.defined)
                    .filter_map(|row| catalogue.matches(&row))
                    .collect()
            })
            .collect();

        let mut merged: BTreeMap<(TradeDate, Symbol), CandidateSignal> = BTreeMap::new();
        for candidate in per_ticker.into_iter().flatten() {
            let key = (candidate.date, candidate.ticker.clone());
            match merged.get_mut(&key) {
                Some(existing) => existing.merge(candidate),
                None => {
                    merged.insert(key, candidate);
                }
            }
        }

        tracing::debug!(
            tickers = panel.len(),
            rules = catalogue.rules.len(),
            candidates = merged.len(),
            "pattern evaluation complete"
        );
        merged.into_values().collect()
    }
}
