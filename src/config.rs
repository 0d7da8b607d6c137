use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_MAX_DEPTH: usize = 64;
pub const DEFAULT_MAX_FORMULA_LENGTH: usize = 4096;

/// Resource limits applied to tenant-supplied formulas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Maximum nesting of parentheses and `NOT` prefixes.
    pub max_depth: usize,
    /// Maximum formula length in characters.
    pub max_formula_length: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_formula_length: DEFAULT_MAX_FORMULA_LENGTH,
        }
    }
}

impl EvaluatorConfig {
    /// Loads limits from `GUARD_EXPR_MAX_DEPTH` and
    /// `GUARD_EXPR_MAX_FORMULA_LENGTH`, falling back to the defaults for unset
    /// variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_depth: limit(&lookup, "GUARD_EXPR_MAX_DEPTH", defaults.max_depth)?,
            max_formula_length: limit(
                &lookup,
                "GUARD_EXPR_MAX_FORMULA_LENGTH",
                defaults.max_formula_length,
            )?,
        })
    }
}

fn limit(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => {
            tracing::warn!(var, value = %raw, "rejecting evaluator limit");
            Err(ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn unset_variables_use_defaults() {
        assert_eq!(
            EvaluatorConfig::from_lookup(lookup(&[])).unwrap(),
            EvaluatorConfig::default()
        );
    }

    #[test]
    fn reads_limits() {
        let config = EvaluatorConfig::from_lookup(lookup(&[
            ("GUARD_EXPR_MAX_DEPTH", "16"),
            ("GUARD_EXPR_MAX_FORMULA_LENGTH", " 1000 "),
        ]))
        .unwrap();
        assert_eq!(config.max_depth, 16);
        assert_eq!(config.max_formula_length, 1000);
    }

    #[test]
    fn rejects_invalid_limits() {
        for bad in ["0", "-1", "lots"] {
            let err = EvaluatorConfig::from_lookup(lookup(&[("GUARD_EXPR_MAX_DEPTH", bad)]))
                .unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidValue {
                    var: "GUARD_EXPR_MAX_DEPTH".into(),
                    value: bad.into(),
                }
            );
        }
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: EvaluatorConfig = serde_json::from_str(r#"{"max_depth": 8}"#).unwrap();
        assert_eq!(config.max_depth, 8);
        assert_eq!(config.max_formula_length, DEFAULT_MAX_FORMULA_LENGTH);
    }
}
