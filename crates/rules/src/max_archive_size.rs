//! `max_archive_size`: bound the total byte size of the submission tree.
//!
//! Single param `max_size_mb` (number, default 100). The rule sums the
//! inventory byte counts; nothing is re-stat'd.

use serde_json::Value;

use acquire::MaterializedTree;

use crate::violation::{RuleOutcome, RuleViolation};

pub const NAME: &str = "max_archive_size";

const DEFAULT_MAX_SIZE_MB: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct MaxArchiveSizeRule {
    params: Value,
}

impl MaxArchiveSizeRule {
    pub fn new(params: Value) -> Self {
        Self { params }
    }

    pub fn validate(&self, tree: &MaterializedTree) -> RuleOutcome {
        let max_size_mb = match self.params.get("max_size_mb") {
            None => DEFAULT_MAX_SIZE_MB,
            Some(v) => match v.as_f64() {
                Some(n) => n,
                None => {
                    return RuleOutcome::fail_single(
                        NAME,
                        RuleViolation::invalid_parameter_type("max_size_mb", "a number", v),
                    );
                }
            },
        };

        if max_size_mb <= 0.0 {
            return RuleOutcome::fail_single(
                NAME,
                RuleViolation::new(
                    "invalidParameterValue",
                    format!("Parameter 'max_size_mb' must be greater than 0, got: {max_size_mb}"),
                )
                .with("parameter", "max_size_mb")
                .with("value", max_size_mb)
                .with("constraint", "must be greater than 0"),
            );
        }

        let total_bytes = tree.total_bytes();
        let file_count = tree.files().len();
        let total_mb = total_bytes as f64 / (1024.0 * 1024.0);

        if total_mb <= max_size_mb {
            RuleOutcome::pass(
                NAME,
                format!("Repository size {total_mb:.2}MB is within limit of {max_size_mb}MB"),
            )
        } else {
            RuleOutcome::fail_single(
                NAME,
                RuleViolation::new(
                    "repositorySizeExceeded",
                    format!(
                        "Repository size {total_mb:.2}MB exceeds maximum allowed size of {max_size_mb}MB"
                    ),
                )
                .with("actual_size_mb", (total_mb * 100.0).round() / 100.0)
                .with("actual_size_bytes", total_bytes)
                .with("max_size_mb", max_size_mb)
                .with("file_count", file_count)
                .with("excess_mb", ((total_mb - max_size_mb) * 100.0).round() / 100.0),
            )
        }
    }
}
