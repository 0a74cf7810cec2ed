//! Types for the comparison layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for a comparison run.
///
/// Cheap to clone and serde-friendly so it can be embedded in higher-level
/// pipeline configs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompareConfig {
    /// Configuration schema version.
    pub version: u32,
    /// A result computed with fewer unique fingerprints than this on either
    /// side is flagged `low_confidence`.
    #[serde(default = "CompareConfig::default_low_confidence_floor")]
    pub low_confidence_floor: usize,
    /// Ceiling on shared-occurrence pair work during region extraction.
    /// Exceeding it truncates region extraction (the score stays exact) and
    /// sets `truncated` on the result.
    #[serde(default = "CompareConfig::default_max_pair_work")]
    pub max_pair_work: u64,
}

impl CompareConfig {
    pub(crate) fn default_low_confidence_floor() -> usize {
        10
    }

    pub(crate) fn default_max_pair_work() -> u64 {
        1_000_000
    }

    /// Validate the configuration for a run.
    pub fn validate(&self) -> Result<(), CompareError> {
        if self.version == 0 {
            return Err(CompareError::InvalidConfig(
                "config version must be >= 1".into(),
            ));
        }
        if self.max_pair_work == 0 {
            return Err(CompareError::InvalidConfig(
                "max_pair_work must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            version: 1,
            low_confidence_floor: Self::default_low_confidence_floor(),
            max_pair_work: Self::default_max_pair_work(),
        }
    }
}

/// A maximal run of consecutive shared fingerprints between two
/// submissions, mapped back to byte spans in the underlying files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchRegion {
    /// Hash of the first shared fingerprint in the run.
    pub hash: u64,
    /// File and byte span on the A side.
    pub file_a: String,
    pub start_a: u32,
    pub end_a: u32,
    /// File and byte span on the B side.
    pub file_b: String,
    pub start_b: u32,
    pub end_b: u32,
    /// Number of tokens the run covers.
    pub token_len: u32,
}

/// The persisted outcome of comparing two fingerprint sets.
///
/// `submission_a` is always the lexicographically smaller id, so
/// `(A, B)` and `(B, A)` comparisons produce identical payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityResult {
    pub submission_a: String,
    pub submission_b: String,
    pub step_id: String,
    /// Containment-style score in [0, 1]:
    /// `|shared hashes| / max(|unique(A)|, |unique(B)|)`.
    pub score: f64,
    pub regions: Vec<MatchRegion>,
    /// Region extraction hit the pair-work ceiling; the score is exact but
    /// the region list is incomplete.
    pub truncated: bool,
    /// Either side had fewer unique fingerprints than the configured floor.
    pub low_confidence: bool,
    /// Timestamp carried from the triggering submission so that re-runs of
    /// the same submission produce byte-identical payloads.
    pub compared_at: DateTime<Utc>,
}

impl SimilarityResult {
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

/// Errors produced by the comparison layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompareError {
    /// Invalid configuration for this run.
    #[error("invalid compare config: {0}")]
    InvalidConfig(String),
    /// The two fingerprint sets belong to different assignment steps.
    #[error("step mismatch: {a} vs {b}; only submissions of the same step are comparable")]
    StepMismatch { a: String, b: String },
}
