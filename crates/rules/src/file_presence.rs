//! `file_presence`: required and forbidden path patterns.
//!
//! Params:
//! - `must_exist`: glob list; every pattern must match at least one path.
//! - `forbidden`: glob list; no pattern may match any path.
//!
//! Globs use `*` (single segment), `**` (any depth) and `?` (single char).
//! At least one of the two lists must be given.

use globset::{Glob, GlobMatcher};
use serde_json::Value;

use acquire::MaterializedTree;

use crate::violation::{RuleOutcome, RuleViolation};

pub const NAME: &str = "file_presence";

#[derive(Debug, Clone)]
pub struct FilePresenceRule {
    params: Value,
}

impl FilePresenceRule {
    pub fn new(params: Value) -> Self {
        Self { params }
    }

    pub fn validate(&self, tree: &MaterializedTree) -> RuleOutcome {
        let must_exist = self.params.get("must_exist");
        let forbidden = self.params.get("forbidden");

        if let Some(v) = must_exist {
            if !v.is_array() {
                return RuleOutcome::fail_single(
                    NAME,
                    RuleViolation::invalid_parameter_type("must_exist", "array", v),
                );
            }
        }
        if let Some(v) = forbidden {
            if !v.is_array() {
                return RuleOutcome::fail_single(
                    NAME,
                    RuleViolation::invalid_parameter_type("forbidden", "array", v),
                );
            }
        }

        let must_exist = list_or_empty(must_exist);
        let forbidden = list_or_empty(forbidden);
        if must_exist.is_empty() && forbidden.is_empty() {
            return RuleOutcome::fail_single(
                NAME,
                RuleViolation::new(
                    "missingRequiredParameters",
                    "At least one 'must_exist' or 'forbidden' pattern must be specified",
                )
                .with("required_parameters", vec!["must_exist", "forbidden"]),
            );
        }

        // All candidate paths: files plus directories, like a filesystem glob.
        let paths: Vec<&str> = tree
            .files()
            .iter()
            .map(|f| f.rel_path.as_str())
            .chain(tree.dirs().iter().map(|d| d.rel_path.as_str()))
            .collect();

        let mut missing: Vec<String> = Vec::new();
        let mut present_forbidden: Vec<String> = Vec::new();

        for pattern in &must_exist {
            let Some(pattern) = pattern.as_str() else {
                return RuleOutcome::fail_single(
                    NAME,
                    RuleViolation::invalid_pattern_type("must_exist", pattern),
                );
            };
            match compile(pattern) {
                Ok(matcher) => {
                    if !paths.iter().any(|p| matcher.is_match(p)) {
                        missing.push(pattern.to_string());
                    }
                }
                Err(err) => {
                    return RuleOutcome::fail_single(NAME, RuleViolation::execution_error(err));
                }
            }
        }

        for pattern in &forbidden {
            let Some(pattern) = pattern.as_str() else {
                return RuleOutcome::fail_single(
                    NAME,
                    RuleViolation::invalid_pattern_type("forbidden", pattern),
                );
            };
            match compile(pattern) {
                Ok(matcher) => {
                    if paths.iter().any(|p| matcher.is_match(p)) {
                        present_forbidden.push(pattern.to_string());
                    }
                }
                Err(err) => {
                    return RuleOutcome::fail_single(NAME, RuleViolation::execution_error(err));
                }
            }
        }

        let mut violations = Vec::new();
        if !missing.is_empty() {
            violations.push(
                RuleViolation::new(
                    "missingRequiredFiles",
                    format!("Missing required files: {}", missing.join(", ")),
                )
                .with("missing_files", missing.clone())
                .with("patterns", must_exist.clone()),
            );
        }
        if !present_forbidden.is_empty() {
            violations.push(
                RuleViolation::new(
                    "forbiddenFilesFound",
                    format!("Forbidden files found: {}", present_forbidden.join(", ")),
                )
                .with("forbidden_files", present_forbidden)
                .with("patterns", forbidden.clone()),
            );
        }

        if violations.is_empty() {
            RuleOutcome::pass(
                NAME,
                "All required files are present and no forbidden files found",
            )
        } else {
            let count = violations.len();
            RuleOutcome::fail_aggregate(
                NAME,
                "fileValidationFailed",
                format!("File validation failed with {count} error(s)"),
                violations,
            )
        }
    }
}

fn list_or_empty(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

fn compile(pattern: &str) -> Result<GlobMatcher, String> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| format!("invalid glob pattern {pattern:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tree_with;
    use serde_json::json;

    #[test]
    fn passes_when_required_files_exist() {
        let (_dir, tree) = tree_with(&["README.md", "src/main.py"]);
        let rule = FilePresenceRule::new(json!({ "must_exist": ["README*", "src/**"] }));
        let outcome = rule.validate(&tree);
        assert!(outcome.passed, "{outcome:?}");
    }

    #[test]
    fn missing_required_file_fails_with_code() {
        let (_dir, tree) = tree_with(&["src/main.py"]);
        let rule = FilePresenceRule::new(json!({ "must_exist": ["README*"] }));
        let outcome = rule.validate(&tree);
        assert!(!outcome.passed);
        assert_eq!(outcome.code.as_deref(), Some("fileValidationFailed"));
        assert_eq!(outcome.violations[0].code, "missingRequiredFiles");
        assert_eq!(outcome.violations[0].context["missing_files"][0], "README*");
    }

    #[test]
    fn forbidden_file_fails() {
        let (_dir, tree) = tree_with(&["src/main.py", "secrets.env"]);
        let rule = FilePresenceRule::new(json!({ "forbidden": ["*.env"] }));
        let outcome = rule.validate(&tree);
        assert!(!outcome.passed);
        assert_eq!(outcome.violations[0].code, "forbiddenFilesFound");
    }

    #[test]
    fn both_violations_aggregate() {
        let (_dir, tree) = tree_with(&["notes.tmp"]);
        let rule = FilePresenceRule::new(json!({
            "must_exist": ["README*"],
            "forbidden": ["*.tmp"],
        }));
        let outcome = rule.validate(&tree);
        assert_eq!(outcome.violations.len(), 2);
    }

    #[test]
    fn double_star_matches_any_depth() {
        let (_dir, tree) = tree_with(&["a/b/c/deep.py"]);
        let rule = FilePresenceRule::new(json!({ "must_exist": ["**/*.py"] }));
        assert!(rule.validate(&tree).passed);
    }

    #[test]
    fn non_array_param_is_invalid_type() {
        let (_dir, tree) = tree_with(&["x.py"]);
        let rule = FilePresenceRule::new(json!({ "must_exist": "README.md" }));
        let outcome = rule.validate(&tree);
        assert_eq!(outcome.code.as_deref(), Some("invalidParameterType"));
    }

    #[test]
    fn non_string_pattern_is_invalid_pattern() {
        let (_dir, tree) = tree_with(&["x.py"]);
        let rule = FilePresenceRule::new(json!({ "must_exist": [42] }));
        let outcome = rule.validate(&tree);
        assert_eq!(outcome.code.as_deref(), Some("invalidPatternType"));
    }

    #[test]
    fn empty_params_require_at_least_one_list() {
        let (_dir, tree) = tree_with(&["x.py"]);
        let rule = FilePresenceRule::new(json!({}));
        let outcome = rule.validate(&tree);
        assert_eq!(outcome.code.as_deref(), Some("missingRequiredParameters"));
    }
}
