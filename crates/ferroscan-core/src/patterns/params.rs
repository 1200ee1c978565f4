//! Typed, documented rule parameters.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::ValidationError;

/// Reserved key in a raw parameter map that pins the rule version.
pub const VERSION_KEY: &str = "version";

/// Flat key -> value overrides for one rule, as supplied by callers.
pub type RawParams = BTreeMap<String, Value>;

/// Type and default of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    Number { default: f64 },
    Flag { default: bool },
}

/// Metadata for a single rule parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(flatten)]
    pub kind: ParamKind,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn number(name: &'static str, default: f64, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Number { default },
            description,
        }
    }

    pub const fn flag(name: &'static str, default: bool, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Flag { default },
            description,
        }
    }

    pub const fn default_value(&self) -> ParamValue {
        match self.kind {
            ParamKind::Number { default } => ParamValue::Number(default),
            ParamKind::Flag { default } => ParamValue::Flag(default),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Flag(bool),
}

/// Fully resolved parameters of one rule: every declared key has a value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ParamSet {
    values: BTreeMap<&'static str, ParamValue>,
}

impl ParamSet {
    pub fn defaults(specs: &[ParamSpec]) -> Self {
        Self {
            values: specs
                .iter()
                .map(|spec| (spec.name, spec.default_value()))
                .collect(),
        }
    }

    /// Applies caller overrides on top of the declared defaults.
    ///
    /// Rejects keys the rule does not declare, values of the wrong type, and
    /// a `version` that differs from the rule's.
    pub fn resolve(
        pattern: &str,
        version: u32,
        specs: &[ParamSpec],
        overrides: Option<&RawParams>,
    ) -> Result<Self, ValidationError> {
        let mut set = Self::defaults(specs);
        let Some(overrides) = overrides else {
            return Ok(set);
        };

        for (key, value) in overrides {
            if key.as_str() == VERSION_KEY {
                let requested = value.as_u64().ok_or_else(|| ValidationError::ParameterType {
                    pattern: pattern.to_owned(),
                    key: key.clone(),
                    expected: "non-negative integer",
                })?;
                if requested != u64::from(version) {
                    return Err(ValidationError::ParameterVersion {
                        pattern: pattern.to_owned(),
                        requested,
                        actual: version,
                    });
                }
                continue;
            }

            let spec = specs
                .iter()
                .find(|spec| spec.name == key.as_str())
                .ok_or_else(|| ValidationError::UnknownParameter {
                    pattern: pattern.to_owned(),
                    key: key.clone(),
                })?;

            let resolved = match spec.kind {
                ParamKind::Number { .. } => value
                    .as_f64()
                    .filter(|number| number.is_finite())
                    .map(ParamValue::Number),
                ParamKind::Flag { .. } => value.as_bool().map(ParamValue::Flag),
            }
            .ok_or_else(|| ValidationError::ParameterType {
                pattern: pattern.to_owned(),
                key: key.clone(),
                expected: match spec.kind {
                    ParamKind::Number { .. } => "number",
                    ParamKind::Flag { .. } => "boolean",
                },
            })?;
            set.values.insert(spec.name, resolved);
        }
        Ok(set)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            ParamValue::Number(value) => Some(*value),
            ParamValue::Flag(_) => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            ParamValue::Flag(value) => Some(*value),
            ParamValue::Number(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, ParamValue)> + '_ {
        self.values.iter().map(|(key, value)| (*key, *value))
    }
}
