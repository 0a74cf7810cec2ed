//! Structural validation rules for submissions.
//!
//! A rule is a pure function from a materialized tree to a structured
//! [`RuleOutcome`]. The registry maps wire-level `{name, params}` specs onto
//! a closed set of rule kinds; unknown names are rejected when the gate is
//! set up, not when it runs. The gate itself runs every configured rule and
//! aggregates all failures into one [`GateReport`] — it never stops at the
//! first violation and never attempts recovery.
//!
//! Built-in rules:
//! - [`file_presence`](crate::file_presence) — required/forbidden path globs
//! - [`max_archive_size`](crate::max_archive_size) — total tree byte cap
//! - [`directory_structure`](crate::directory_structure) — required/
//!   forbidden directories, depth and emptiness constraints

mod directory_structure;
mod file_presence;
mod max_archive_size;
#[cfg(test)]
mod test_support;
mod violation;

pub use crate::directory_structure::DirectoryStructureRule;
pub use crate::file_presence::FilePresenceRule;
pub use crate::max_archive_size::MaxArchiveSizeRule;
pub use crate::violation::{GateReport, RuleOutcome, RuleViolation};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use acquire::MaterializedTree;

/// Wire form of one configured rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

impl RuleSpec {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Names accepted by [`compile_rules`].
pub const AVAILABLE_RULES: &[&str] = &[
    file_presence::NAME,
    max_archive_size::NAME,
    directory_structure::NAME,
];

/// A compiled rule ready to run.
#[derive(Debug, Clone)]
pub enum Rule {
    FilePresence(FilePresenceRule),
    MaxArchiveSize(MaxArchiveSizeRule),
    DirectoryStructure(DirectoryStructureRule),
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::FilePresence(_) => file_presence::NAME,
            Rule::MaxArchiveSize(_) => max_archive_size::NAME,
            Rule::DirectoryStructure(_) => directory_structure::NAME,
        }
    }

    /// Run this rule against a tree. Parameter problems surface as
    /// violations in the outcome, never as panics.
    pub fn validate(&self, tree: &MaterializedTree) -> RuleOutcome {
        match self {
            Rule::FilePresence(rule) => rule.validate(tree),
            Rule::MaxArchiveSize(rule) => rule.validate(tree),
            Rule::DirectoryStructure(rule) => rule.validate(tree),
        }
    }
}

/// Setup-time errors: raised before any submission is processed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RuleSetupError {
    #[error("unknown rule {name:?}; available rules: {available:?}")]
    UnknownRule {
        name: String,
        available: Vec<String>,
    },
}

/// Resolve rule specs against the registry. Unknown names fail the whole
/// set so misconfigured gates are caught at startup.
pub fn compile_rules(specs: &[RuleSpec]) -> Result<Vec<Rule>, RuleSetupError> {
    specs
        .iter()
        .map(|spec| match spec.name.as_str() {
            file_presence::NAME => Ok(Rule::FilePresence(FilePresenceRule::new(
                spec.params.clone(),
            ))),
            max_archive_size::NAME => Ok(Rule::MaxArchiveSize(MaxArchiveSizeRule::new(
                spec.params.clone(),
            ))),
            directory_structure::NAME => Ok(Rule::DirectoryStructure(
                DirectoryStructureRule::new(spec.params.clone()),
            )),
            other => Err(RuleSetupError::UnknownRule {
                name: other.to_string(),
                available: AVAILABLE_RULES.iter().map(|s| s.to_string()).collect(),
            }),
        })
        .collect()
}

/// Run every rule and aggregate the outcomes. All rules run even after a
/// failure; the caller short-circuits the pipeline on a failed report.
pub fn run_gate(tree: &MaterializedTree, rules: &[Rule]) -> GateReport {
    GateReport {
        outcomes: rules.iter().map(|rule| rule.validate(tree)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tree_with;
    use serde_json::json;

    #[test]
    fn compile_resolves_known_rules() {
        let rules = compile_rules(&[
            RuleSpec::new("file_presence", json!({ "must_exist": ["README*"] })),
            RuleSpec::new("max_archive_size", json!({ "max_size_mb": 10 })),
            RuleSpec::new("directory_structure", json!({ "max_depth": 4 })),
        ])
        .unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].name(), "file_presence");
    }

    #[test]
    fn unknown_rule_rejected_at_setup() {
        let err = compile_rules(&[RuleSpec::new("virus_scan", json!({}))]).unwrap_err();
        match err {
            RuleSetupError::UnknownRule { name, available } => {
                assert_eq!(name, "virus_scan");
                assert!(available.contains(&"file_presence".to_string()));
            }
        }
    }

    #[test]
    fn gate_runs_all_rules_and_aggregates_failures() {
        let (_dir, tree) = tree_with(&["src/main.py"]);
        let rules = compile_rules(&[
            RuleSpec::new("file_presence", json!({ "must_exist": ["README*"] })),
            RuleSpec::new("directory_structure", json!({ "required_directories": ["docs"] })),
            RuleSpec::new("max_archive_size", json!({ "max_size_mb": 100 })),
        ])
        .unwrap();

        let report = run_gate(&tree, &rules);
        assert!(!report.passed());
        // Both failing rules report; the passing one is present too.
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failures().count(), 2);
    }

    #[test]
    fn empty_rule_set_passes_everything() {
        let (_dir, tree) = tree_with(&[]);
        let report = run_gate(&tree, &[]);
        assert!(report.passed());
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn rule_spec_deserializes_from_wire_json() {
        let spec: RuleSpec = serde_json::from_value(json!({
            "name": "file_presence",
            "params": { "must_exist": ["README*"] },
        }))
        .unwrap();
        assert_eq!(spec.name, "file_presence");
        assert!(compile_rules(&[spec]).is_ok());
    }
}
