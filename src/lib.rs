//! Workspace umbrella crate for simscan, the similarity-detection core of a
//! plagiarism-detection service for student code submissions.
//!
//! The `simscan` crate re-exports the acquisition, rule-gate, tokenization,
//! fingerprinting, storage and comparison layers so applications can drive
//! the full pipeline through a single dependency. [`Pipeline::run`] (and the
//! [`run_pipeline`] convenience wrapper) orchestrates one submission
//! end-to-end:
//!
//! ```text
//! Acquired → Validated → Tokenized → Fingerprinted → Stored → Compared → Done
//!      │          │           │             │            │         │
//!      └──Failed──┴───────────┴─────────────┴────────────┴─────────┘
//! ```
//!
//! Acquisition and rule-gate failures are terminal; per-file tokenizer
//! problems and per-peer comparator problems are recorded as warnings and
//! never fail the run. All fingerprint writes for a submission land in one
//! store transaction before any peer comparison starts, and re-running a
//! submission id atomically replaces its prior artifacts.
//!
//! ## Observability
//!
//! Install a [`PipelineMetrics`] recorder with [`set_pipeline_metrics`]
//! and/or a [`PipelineEventLogger`] with [`set_pipeline_logger`]; both
//! receive per-stage latencies and outcomes for every run.

pub use acquire::{
    AcquireConfig, AcquireError, AcquireGate, Acquirer, FileEntry, MaterializedTree,
    SourceLocator,
};
pub use compare::{CompareConfig, CompareError, MatchRegion, SimilarityResult};
pub use fingerprint::{
    fingerprint_stream, FingerprintConfig, FingerprintError, FingerprintSet,
};
pub use rules::{
    compile_rules, run_gate, GateReport, Rule, RuleOutcome, RuleSetupError, RuleSpec,
    RuleViolation,
};
pub use store::{
    migrate, BackendConfig, FingerprintStore, MigrationReport, SchemaParams, StoreConfig,
    StoreError, STORE_SCHEMA_VERSION,
};
pub use tokenize::{
    classify, tokenize_file, ClassifyConfig, FileClass, Language, Token, TokenKind,
    TokenStream, TokenizerWarning,
};

pub mod config;
mod observe;
mod pipeline;

pub use crate::observe::{
    set_pipeline_logger, set_pipeline_metrics, KeyValueLogger, PipelineEvent,
    PipelineEventLogger, PipelineEventStatus, PipelineMetrics, PipelineStage,
};
pub use crate::pipeline::{run_pipeline, Pipeline, PipelineSetupError, ResultsHandle};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to one submission, produced by the external submission
/// service. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionRef {
    pub submission_id: String,
    /// Comparison cohort: only submissions sharing a step are compared.
    pub step_id: String,
    pub group_id: String,
    pub project_id: String,
    pub source_locator: SourceLocator,
    /// Submission timestamp; also stamped onto similarity results so
    /// re-runs stay byte-identical.
    pub submitted_at: DateTime<Utc>,
}

/// Per-run pipeline options. Resolution order is explicit options >
/// process configuration > built-in defaults; see
/// [`config::SimscanConfig::resolve_options`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineOptions {
    /// k-gram size in tokens (>= 2).
    pub k_gram_size: usize,
    /// Winnowing window size in k-grams (>= k_gram_size).
    pub window_size: usize,
    /// Results at or above this score become alerts.
    pub alert_threshold: f64,
    /// Files larger than this are excluded from tokenization.
    pub per_file_byte_cap: u64,
    /// Total materialized-tree byte cap.
    pub total_tree_byte_cap: u64,
    /// Wall-clock deadline for the whole run.
    pub deadline_ms: u64,
    /// Worker-pool width for per-file and per-peer work.
    pub parallelism: usize,
    /// Persist token streams for alignment rendering.
    pub store_token_streams: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            k_gram_size: 5,
            window_size: 7,
            alert_threshold: 0.7,
            per_file_byte_cap: 1_048_576,
            total_tree_byte_cap: 524_288_000,
            deadline_ms: 600_000,
            parallelism: default_parallelism(),
            store_token_streams: true,
        }
    }
}

pub(crate) fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl PipelineOptions {
    /// Validate option consistency before a run.
    pub fn validate(&self) -> Result<(), String> {
        if self.k_gram_size < 2 {
            return Err(format!("k_gram_size must be >= 2, got {}", self.k_gram_size));
        }
        if self.window_size < self.k_gram_size {
            return Err(format!(
                "window_size ({}) must be >= k_gram_size ({})",
                self.window_size, self.k_gram_size
            ));
        }
        if !(0.0..=1.0).contains(&self.alert_threshold) {
            return Err(format!(
                "alert_threshold must be in [0, 1], got {}",
                self.alert_threshold
            ));
        }
        if self.deadline_ms == 0 {
            return Err("deadline_ms must be greater than zero".into());
        }
        if self.parallelism == 0 {
            return Err("parallelism must be greater than zero".into());
        }
        Ok(())
    }
}

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Done,
    Failed,
}

/// Terminal failure: a stable code plus human-readable context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineFailure {
    /// Stable machine-readable code, e.g. `deadlineExceeded`.
    pub code: String,
    pub message: String,
}

impl PipelineFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Non-fatal problem recorded during a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineWarning {
    /// Stable code: `tokenizerFailure`, `comparatorFailure`, `fileExcluded`.
    pub code: String,
    /// The affected file path or peer submission id.
    pub subject: String,
    pub message: String,
}

impl PipelineWarning {
    pub fn new(
        code: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            subject: subject.into(),
            message: message.into(),
        }
    }
}

/// One peer comparison, summarized for the outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilaritySummary {
    pub peer_submission_id: String,
    pub score: f64,
    pub truncated: bool,
    pub low_confidence: bool,
    pub region_count: usize,
}

/// The result of driving one submission through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineOutcome {
    pub submission_id: String,
    pub step_id: String,
    pub state: PipelineState,
    /// Per-rule results; empty when the gate never ran.
    pub rule_report: GateReport,
    /// Peer comparisons, sorted by score descending.
    pub summaries: Vec<SimilaritySummary>,
    /// Summaries whose score reached the alert threshold.
    pub alerts: Vec<SimilaritySummary>,
    pub warnings: Vec<PipelineWarning>,
    /// Terminal error; present exactly when `state` is `Failed`.
    pub error: Option<PipelineFailure>,
}

impl PipelineOutcome {
    pub fn is_done(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub(crate) fn failed(
        submission: &SubmissionRef,
        rule_report: GateReport,
        warnings: Vec<PipelineWarning>,
        failure: PipelineFailure,
    ) -> Self {
        Self {
            submission_id: submission.submission_id.clone(),
            step_id: submission.step_id.clone(),
            state: PipelineState::Failed,
            rule_report,
            summaries: Vec::new(),
            alerts: Vec::new(),
            warnings,
            error: Some(failure),
        }
    }
}
