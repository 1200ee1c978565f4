//! Behavior-driven tests for pattern selection and parameter handling.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{breakout_market, date, fast_config};
use ferroscan_core::{
    FeatureRow, ParamSet, ParamSpec, PatternCatalogue, PatternRule, RawParams, RuleInfo,
    ScanError, ScanPipeline, ScanRequest, TradingCalendar, ValidationError,
};
use serde_json::json;

fn overrides(value: serde_json::Value) -> BTreeMap<String, RawParams> {
    serde_json::from_value(value).expect("object of objects")
}

/// Matches any session trading at least `min_relative_volume` times its average.
struct VolumeBurst;

const VOLUME_BURST_PARAMS: &[ParamSpec] = &[ParamSpec::number(
    "min_relative_volume",
    10.0,
    "volume / 20-bar average volume",
)];

impl PatternRule for VolumeBurst {
    fn name(&self) -> &'static str {
        "volumeBurst"
    }

    fn version(&self) -> u32 {
        1
    }

    fn title(&self) -> &'static str {
        "volume burst"
    }

    fn params(&self) -> &'static [ParamSpec] {
        VOLUME_BURST_PARAMS
    }

    fn required_widths(&self) -> &'static [usize] {
        &[]
    }

    fn evaluate(&self, row: &FeatureRow<'_>, params: &ParamSet) -> bool {
        match (row.relative_volume, params.number("min_relative_volume")) {
            (Some(relative), Some(floor)) => relative >= floor,
            _ => false,
        }
    }
}

// =============================================================================
// Catalogue: Parameter Validation
// =============================================================================

#[test]
fn when_a_parameter_key_is_misspelled_the_pipeline_refuses_to_start() {
    // Given: An override for a key patternA does not declare
    let source = Arc::new(breakout_market().build());
    let mut config = fast_config();
    config.patterns.params = overrides(json!({"patternA": {"min_gap": 0.2}}));

    // When: The pipeline is built
    let result = ScanPipeline::new(source.clone(), source.clone(), config);

    // Then: It fails as invalid configuration before any provider call
    assert!(matches!(
        result,
        Err(ScanError::InvalidConfig(ValidationError::UnknownParameter { ref key, .. })) if key == "min_gap"
    ));
    assert_eq!(source.daily_calls(), 0);
}

#[test]
fn when_a_parameter_has_the_wrong_type_it_is_rejected() {
    // Given: A boolean parameter given a string
    let result = PatternCatalogue::standard().resolve(
        &overrides(json!({"patternB": {"require_new_high": "yes"}})),
        &[],
        &[2, 3, 8, 15],
    );

    // Then: The type mismatch is named
    assert!(matches!(
        result,
        Err(ValidationError::ParameterType { ref pattern, expected: "boolean", .. }) if pattern == "patternB"
    ));
}

#[test]
fn parameter_sets_may_pin_the_rule_version() {
    // Given: One set pinned to the current version, one to a future version
    let catalogue = PatternCatalogue::standard();
    let widths = [2, 3, 8, 15];

    // When: Both are resolved
    let current = catalogue.resolve(&overrides(json!({"patternC": {"version": 1}})), &[], &widths);
    let future = catalogue.resolve(&overrides(json!({"patternC": {"version": 2}})), &[], &widths);

    // Then: Only the matching version is accepted
    assert!(current.is_ok());
    assert!(matches!(future, Err(ValidationError::ParameterVersion { requested: 2, actual: 1, .. })));
}

#[test]
fn every_standard_rule_lists_typed_defaults() {
    // Given: The standard catalogue
    let catalogue = PatternCatalogue::standard();

    // When: Its rules are described
    let infos: Vec<RuleInfo> = catalogue.rules().iter().map(|rule| RuleInfo::of(rule.as_ref())).collect();
    let json = serde_json::to_value(&infos).expect("serializable");

    // Then: Each parameter carries a type, a default and a description
    assert_eq!(infos.len(), 3);
    assert_eq!(json[0]["name"], "patternA");
    assert_eq!(json[0]["params"][0]["name"], "min_gap_pct");
    assert_eq!(json[0]["params"][0]["type"], "number");
    assert_eq!(json[0]["params"][0]["default"], 0.1);
    assert_eq!(json[1]["lookback_widths"], json!([3, 15]));
}

// =============================================================================
// Catalogue: Selection and Overrides in a Scan
// =============================================================================

#[tokio::test]
async fn selecting_one_rule_reports_only_that_rule() {
    // Given: Only patternC is selected
    let source = Arc::new(breakout_market().build());
    let mut config = fast_config();
    config.patterns.selected = vec![String::from("patternC")];
    let pipeline = ScanPipeline::new(source.clone(), source, config).expect("valid");

    // When: The signal day is scanned
    let outcome = pipeline
        .run(ScanRequest::new(date("2025-02-18"), date("2025-02-18")).expect("valid"))
        .await
        .expect("scan runs");

    // Then: RUNR matches patternC alone
    assert_eq!(outcome.signals.len(), 1);
    assert_eq!(outcome.signals[0].matched_patterns, vec!["patternC"]);
}

#[tokio::test]
async fn tightening_a_threshold_removes_that_rule_from_the_match() {
    // Given: patternA demands a 50% opening gap
    let source = Arc::new(breakout_market().build());
    let mut config = fast_config();
    config.patterns.params = overrides(json!({"patternA": {"min_gap_pct": 0.5}}));
    let pipeline = ScanPipeline::new(source.clone(), source, config).expect("valid");

    // When: The signal day is scanned
    let outcome = pipeline
        .run(ScanRequest::new(date("2025-02-18"), date("2025-02-18")).expect("valid"))
        .await
        .expect("scan runs");

    // Then: The 20% gap no longer satisfies patternA
    assert_eq!(outcome.signals[0].matched_patterns, vec!["patternB", "patternC"]);
}

#[tokio::test]
async fn a_registered_custom_rule_runs_through_the_same_engines() {
    // Given: The standard catalogue plus a volume-burst rule, selected alone
    let source = Arc::new(breakout_market().build());
    let mut catalogue = PatternCatalogue::standard();
    catalogue.register(Arc::new(VolumeBurst)).expect("new name");
    let mut config = fast_config();
    config.patterns.selected = vec![String::from("volumeBurst")];
    config.validation.min_premarket_dollar_volume = 0.0;
    let pipeline = ScanPipeline::with_catalogue(
        source.clone(),
        source,
        config,
        &catalogue,
        TradingCalendar::us_equities(),
    )
    .expect("valid");

    // When: The signal day is scanned
    let outcome = pipeline
        .run(ScanRequest::new(date("2025-02-18"), date("2025-02-18")).expect("valid"))
        .await
        .expect("scan runs");

    // Then: Both 20x-volume breakouts match the custom rule
    let tickers: Vec<_> = outcome.signals.iter().map(|signal| signal.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["RUNR", "THIN"]);
    assert!(outcome
        .signals
        .iter()
        .all(|signal| signal.matched_patterns == vec!["volumeBurst"]));
}
