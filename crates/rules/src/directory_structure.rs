//! `directory_structure`: required/forbidden directories, depth and
//! emptiness constraints.
//!
//! Params:
//! - `required_directories`: patterns that must each match a directory.
//! - `forbidden_directories`: patterns no directory may match.
//! - `max_depth`: maximum directory depth in edges from the root (>= 1).
//! - `allow_empty_dirs`: whether empty directories are acceptable
//!   (default true).
//!
//! A bare pattern without separators or glob metacharacters matches any
//! path segment, so `"node_modules"` catches `web/node_modules` too.

use globset::{Glob, GlobMatcher};
use serde_json::{json, Value};

use acquire::MaterializedTree;

use crate::violation::{RuleOutcome, RuleViolation};

pub const NAME: &str = "directory_structure";

#[derive(Debug, Clone)]
pub struct DirectoryStructureRule {
    params: Value,
}

impl DirectoryStructureRule {
    pub fn new(params: Value) -> Self {
        Self { params }
    }

    pub fn validate(&self, tree: &MaterializedTree) -> RuleOutcome {
        let required = self.params.get("required_directories");
        let forbidden = self.params.get("forbidden_directories");
        let max_depth = self.params.get("max_depth");
        let allow_empty = self.params.get("allow_empty_dirs");

        for (name, value) in [("required_directories", required), ("forbidden_directories", forbidden)] {
            if let Some(v) = value {
                if !v.is_array() {
                    return RuleOutcome::fail_single(
                        NAME,
                        RuleViolation::invalid_parameter_type(name, "array", v),
                    );
                }
            }
        }

        let max_depth = match max_depth {
            None => None,
            Some(v) => match v.as_i64() {
                Some(n) if n >= 1 => Some(n as usize),
                Some(n) => {
                    return RuleOutcome::fail_single(
                        NAME,
                        RuleViolation::new(
                            "invalidParameterValue",
                            format!("Parameter 'max_depth' must be greater than 0, got: {n}"),
                        )
                        .with("parameter", "max_depth")
                        .with("value", n)
                        .with("constraint", "must be greater than 0"),
                    );
                }
                None => {
                    return RuleOutcome::fail_single(
                        NAME,
                        RuleViolation::invalid_parameter_type("max_depth", "an integer", v),
                    );
                }
            },
        };

        let allow_empty_dirs = match allow_empty {
            None => true,
            Some(v) => match v.as_bool() {
                Some(b) => b,
                None => {
                    return RuleOutcome::fail_single(
                        NAME,
                        RuleViolation::invalid_parameter_type("allow_empty_dirs", "a boolean", v),
                    );
                }
            },
        };

        let required = list_or_empty(required);
        let forbidden = list_or_empty(forbidden);
        if required.is_empty() && forbidden.is_empty() && max_depth.is_none() {
            return RuleOutcome::fail_single(
                NAME,
                RuleViolation::new(
                    "missingRequiredParameters",
                    "At least one validation parameter must be specified: \
                     'required_directories', 'forbidden_directories', or 'max_depth'",
                )
                .with(
                    "required_parameters",
                    vec!["required_directories", "forbidden_directories", "max_depth"],
                ),
            );
        }

        let mut missing_dirs: Vec<String> = Vec::new();
        let mut forbidden_dirs: Vec<String> = Vec::new();

        for pattern in &required {
            let Some(pattern) = pattern.as_str() else {
                return RuleOutcome::fail_single(
                    NAME,
                    RuleViolation::invalid_pattern_type("required_directories", pattern),
                );
            };
            let matcher = match DirMatcher::compile(pattern) {
                Ok(m) => m,
                Err(err) => {
                    return RuleOutcome::fail_single(NAME, RuleViolation::execution_error(err))
                }
            };
            if !tree.dirs().iter().any(|d| matcher.is_match(&d.rel_path)) {
                missing_dirs.push(pattern.to_string());
            }
        }

        for pattern in &forbidden {
            let Some(pattern) = pattern.as_str() else {
                return RuleOutcome::fail_single(
                    NAME,
                    RuleViolation::invalid_pattern_type("forbidden_directories", pattern),
                );
            };
            let matcher = match DirMatcher::compile(pattern) {
                Ok(m) => m,
                Err(err) => {
                    return RuleOutcome::fail_single(NAME, RuleViolation::execution_error(err))
                }
            };
            for dir in tree.dirs() {
                if matcher.is_match(&dir.rel_path) && !forbidden_dirs.contains(&dir.rel_path) {
                    forbidden_dirs.push(dir.rel_path.clone());
                }
            }
        }

        let mut depth_violations = Vec::new();
        if let Some(max_depth) = max_depth {
            for dir in tree.dirs() {
                if dir.depth > max_depth {
                    depth_violations.push(json!({
                        "directory": dir.rel_path,
                        "depth": dir.depth,
                        "max_allowed": max_depth,
                    }));
                }
            }
        }

        let mut empty_dirs: Vec<String> = Vec::new();
        if !allow_empty_dirs {
            for dir in tree.dirs() {
                if dir.entry_count == 0 {
                    empty_dirs.push(dir.rel_path.clone());
                }
            }
        }

        let mut violations = Vec::new();
        if !missing_dirs.is_empty() {
            violations.push(
                RuleViolation::new(
                    "missingRequiredDirectories",
                    format!("Missing required directories: {}", missing_dirs.join(", ")),
                )
                .with("missing_directories", missing_dirs)
                .with("patterns", required.clone()),
            );
        }
        if !forbidden_dirs.is_empty() {
            violations.push(
                RuleViolation::new(
                    "forbiddenDirectoriesFound",
                    format!("Forbidden directories found: {}", forbidden_dirs.join(", ")),
                )
                .with("forbidden_directories", forbidden_dirs)
                .with("patterns", forbidden.clone()),
            );
        }
        if !depth_violations.is_empty() {
            let count = depth_violations.len();
            violations.push(
                RuleViolation::new(
                    "directoryDepthExceeded",
                    format!(
                        "Directory depth exceeded: {count} directories exceed maximum depth of {}",
                        max_depth.unwrap_or_default()
                    ),
                )
                .with("violations", depth_violations)
                .with("max_depth", max_depth.unwrap_or_default() as u64),
            );
        }
        if !empty_dirs.is_empty() {
            violations.push(
                RuleViolation::new(
                    "emptyDirectoriesFound",
                    format!("Empty directories found: {}", empty_dirs.join(", ")),
                )
                .with("empty_directories", empty_dirs),
            );
        }

        if violations.is_empty() {
            let total = tree.dirs().len();
            let mut message =
                format!("Directory structure validation passed: {total} directories checked");
            if let Some(depth) = max_depth {
                message.push_str(&format!(", max depth: {depth}"));
            }
            RuleOutcome::pass(NAME, message)
        } else {
            let count = violations.len();
            RuleOutcome::fail_aggregate(
                NAME,
                "directoryStructureValidationFailed",
                format!("Directory structure validation failed with {count} error(s)"),
                violations,
            )
        }
    }
}

/// Directory pattern matching: globs on the relative path, plus bare-name
/// segment matching for patterns without separators or metacharacters.
struct DirMatcher {
    glob: GlobMatcher,
    bare_segment: Option<String>,
}

impl DirMatcher {
    fn compile(pattern: &str) -> Result<Self, String> {
        let glob = Glob::new(pattern)
            .map(|g| g.compile_matcher())
            .map_err(|e| format!("invalid glob pattern {pattern:?}: {e}"))?;
        let bare = !pattern.contains('/') && !pattern.contains(['*', '?', '[']);
        Ok(Self {
            glob,
            bare_segment: bare.then(|| pattern.to_string()),
        })
    }

    fn is_match(&self, rel_path: &str) -> bool {
        if self.glob.is_match(rel_path) {
            return true;
        }
        match &self.bare_segment {
            Some(segment) => rel_path.split('/').any(|part| part == segment),
            None => false,
        }
    }
}

fn list_or_empty(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}
