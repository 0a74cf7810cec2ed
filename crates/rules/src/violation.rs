//! Structured rule violations.
//!
//! A violation is data, not an exception: a stable machine-readable code, a
//! human-readable message, and free-form context fields (the offending
//! paths, patterns, limits). The gate aggregates violations across rules
//! and reports them all; nothing throws on first failure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One structured rule violation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleViolation {
    /// Stable machine-readable code, surfaced verbatim in outcomes.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Context fields: offending paths, patterns, expected/actual values.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

impl RuleViolation {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: Map::new(),
        }
    }

    /// Attach a context field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Convenience for the recurring parameter-type violation.
    pub fn invalid_parameter_type(
        parameter: &str,
        expected: &str,
        actual: &Value,
    ) -> Self {
        RuleViolation::new(
            "invalidParameterType",
            format!(
                "Parameter '{parameter}' must be {expected}, got: {actual}"
            ),
        )
        .with("parameter", parameter)
        .with("expected_type", expected)
        .with("actual_value", actual.clone())
    }

    /// Convenience for the recurring pattern-type violation.
    pub fn invalid_pattern_type(parameter: &str, pattern: &Value) -> Self {
        RuleViolation::new(
            "invalidPatternType",
            format!("All patterns in '{parameter}' must be strings, got: {pattern}"),
        )
        .with("parameter", parameter)
        .with("pattern", pattern.clone())
        .with("expected_type", "string")
    }

    /// Convenience for a rule that failed unexpectedly.
    pub fn execution_error(message: impl Into<String>) -> Self {
        let message = message.into();
        RuleViolation::new("ruleExecutionError", format!("Rule execution error: {message}"))
            .with("error_message", message)
    }
}

/// The result of running one rule against a tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleOutcome {
    /// Rule name as registered.
    pub rule: String,
    pub passed: bool,
    /// Pass confirmation or failure summary.
    pub message: String,
    /// Aggregate failure code (e.g. `fileValidationFailed`); `None` on pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Individual violations behind the aggregate code.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<RuleViolation>,
}

impl RuleOutcome {
    pub fn pass(rule: &str, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            passed: true,
            message: message.into(),
            code: None,
            violations: Vec::new(),
        }
    }

    /// A failure caused by a single violation; the outcome code is the
    /// violation's own code.
    pub fn fail_single(rule: &str, violation: RuleViolation) -> Self {
        Self {
            rule: rule.to_string(),
            passed: false,
            message: violation.message.clone(),
            code: Some(violation.code.clone()),
            violations: vec![violation],
        }
    }

    /// A failure aggregating several violations under a rule-level code.
    pub fn fail_aggregate(
        rule: &str,
        code: &str,
        message: impl Into<String>,
        violations: Vec<RuleViolation>,
    ) -> Self {
        Self {
            rule: rule.to_string(),
            passed: false,
            message: message.into(),
            code: Some(code.to_string()),
            violations,
        }
    }
}

/// Aggregated report for a full gate run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GateReport {
    pub outcomes: Vec<RuleOutcome>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }
}
