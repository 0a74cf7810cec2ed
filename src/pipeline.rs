//! The orchestrator: drives one submission end-to-end.
//!
//! One coordinator thread owns the run; per-file work (classify, tokenize,
//! fingerprint) and per-peer comparisons fan out on a bounded rayon pool
//! whose width comes from the run options. Workers block only on
//! filesystem and store I/O. Cancellation is cooperative: the deadline is
//! checked between units of work, in-flight files finish, queued work is
//! dropped, and nothing can leave the store half-written because every
//! fingerprint write for a submission travels in one transaction.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use thiserror::Error;

use acquire::{AcquireConfig, Acquirer, MaterializedTree};
use compare::{compare, CompareConfig, MatchRegion, SimilarityResult};
use fingerprint::{fingerprint_stream, FileFingerprints, FingerprintConfig, FingerprintSet};
use rules::{compile_rules, run_gate, GateReport, RuleSpec};
use store::{FingerprintStore, StoreError};
use tokenize::{classify, tokenize_file, ClassifyConfig, FileClass, TokenStream};

use crate::observe::{finish_span, PipelineStage, StageSpan};
use crate::{
    PipelineFailure, PipelineOptions, PipelineOutcome, PipelineState, PipelineWarning,
    SimilaritySummary, SubmissionRef,
};

/// Errors raised while constructing a [`Pipeline`]; configuration problems
/// that should surface at service startup, not per submission.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineSetupError {
    #[error(transparent)]
    Acquire(#[from] acquire::AcquireError),
    #[error(transparent)]
    Compare(#[from] compare::CompareError),
}

/// The pipeline service object: a store handle, the acquirer with its
/// process-wide concurrency gate, and the comparison configuration.
pub struct Pipeline {
    store: Arc<FingerprintStore>,
    acquirer: Acquirer,
    compare_cfg: CompareConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<FingerprintStore>,
        acquire_cfg: AcquireConfig,
        compare_cfg: CompareConfig,
    ) -> Result<Self, PipelineSetupError> {
        compare_cfg.validate()?;
        let acquirer = Acquirer::new(acquire_cfg)?;
        Ok(Self {
            store,
            acquirer,
            compare_cfg,
        })
    }

    /// Query handle for a submission's stored artifacts: match regions and
    /// token streams for rendering.
    pub fn results(&self, step_id: &str, submission_id: &str) -> ResultsHandle {
        ResultsHandle {
            store: Arc::clone(&self.store),
            step_id: step_id.to_string(),
            submission_id: submission_id.to_string(),
        }
    }

    /// Drive one submission through the pipeline. Never panics; every
    /// failure mode is a `Failed` outcome with a stable error code.
    pub fn run(
        &self,
        submission: &SubmissionRef,
        rule_specs: &[RuleSpec],
        options: &PipelineOptions,
    ) -> PipelineOutcome {
        let sub_id = &submission.submission_id;
        let step_id = &submission.step_id;

        if let Err(msg) = options.validate() {
            return PipelineOutcome::failed(
                submission,
                GateReport::default(),
                Vec::new(),
                PipelineFailure::new("invalidParameterValue", msg),
            );
        }
        let params = self.store.params();
        if params.k != options.k_gram_size as u32 || params.w != options.window_size as u32 {
            return PipelineOutcome::failed(
                submission,
                GateReport::default(),
                Vec::new(),
                PipelineFailure::new(
                    "invalidParameterValue",
                    format!(
                        "store is pinned to k={}, w={}; requested k={}, w={} requires a migration",
                        params.k, params.w, options.k_gram_size, options.window_size
                    ),
                ),
            );
        }

        let deadline = Instant::now() + Duration::from_millis(options.deadline_ms);
        let mut warnings: Vec<PipelineWarning> = Vec::new();

        // --- Acquire ---
        let span = StageSpan::start(PipelineStage::Acquire, sub_id, step_id);
        let tree = match self
            .acquirer
            .acquire_capped(&submission.source_locator, options.total_tree_byte_cap)
        {
            Ok(tree) => {
                finish_span(span, None);
                tree
            }
            Err(err) => {
                finish_span(span, Some(err.to_string()));
                return PipelineOutcome::failed(
                    submission,
                    GateReport::default(),
                    warnings,
                    PipelineFailure::new(err.code(), err.to_string()),
                );
            }
        };

        // --- Rule gate ---
        let span = StageSpan::start(PipelineStage::Gate, sub_id, step_id);
        let compiled = match compile_rules(rule_specs) {
            Ok(rules) => rules,
            Err(err) => {
                finish_span(span, Some(err.to_string()));
                return PipelineOutcome::failed(
                    submission,
                    GateReport::default(),
                    warnings,
                    PipelineFailure::new("ruleExecutionError", err.to_string()),
                );
            }
        };
        let report = run_gate(&tree, &compiled);
        if !report.passed() {
            let failed = report.failures().count();
            finish_span(span, Some(format!("{failed} rule(s) failed")));
            return PipelineOutcome::failed(
                submission,
                report,
                warnings,
                PipelineFailure::new("validationFailed", format!("{failed} rule(s) failed")),
            );
        }
        finish_span(span, None);

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(options.parallelism)
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                return PipelineOutcome::failed(
                    submission,
                    report,
                    warnings,
                    PipelineFailure::new(
                        "pipelineInitializationFailed",
                        format!("worker pool: {err}"),
                    ),
                );
            }
        };

        // --- Classify + tokenize, one task per file ---
        let span = StageSpan::start(PipelineStage::Tokenize, sub_id, step_id);
        let cancelled = AtomicBool::new(false);
        let classify_cfg = ClassifyConfig {
            per_file_byte_cap: options.per_file_byte_cap,
        };
        let tokenized: Vec<TokenizeOutput> = pool.install(|| {
            tree.files()
                .par_iter()
                .map(|entry| tokenize_one(&tree, entry, &classify_cfg, deadline, &cancelled))
                .collect()
        });
        if cancelled.load(Ordering::Relaxed) {
            finish_span(span, Some("deadline exceeded".into()));
            return deadline_failure(submission, report, warnings, options);
        }
        let mut streams: Vec<TokenStream> = Vec::new();
        for output in tokenized {
            warnings.extend(output.warnings);
            if let Some(stream) = output.stream {
                streams.push(stream);
            }
        }
        finish_span(span, None);

        // --- Fingerprint, one task per stream ---
        let span = StageSpan::start(PipelineStage::Fingerprint, sub_id, step_id);
        let fp_cfg = FingerprintConfig {
            version: 1,
            k: options.k_gram_size,
            w: options.window_size,
            seed: params.seed,
        };
        let file_fingerprints: Vec<FileFingerprints> = pool.install(|| {
            streams
                .par_iter()
                .map(|stream| {
                    if Instant::now() >= deadline {
                        cancelled.store(true, Ordering::Relaxed);
                    }
                    fingerprint_stream(stream, &fp_cfg)
                })
                .collect()
        });
        if cancelled.load(Ordering::Relaxed) {
            finish_span(span, Some("deadline exceeded".into()));
            return deadline_failure(submission, report, warnings, options);
        }
        finish_span(span, None);

        let mut set = FingerprintSet::new(sub_id.clone(), step_id.clone(), fp_cfg.k as u32);
        for file in file_fingerprints {
            set.insert_file(file);
        }

        // --- Store: one atomic batch for the whole submission ---
        let span = StageSpan::start(PipelineStage::Store, sub_id, step_id);
        let persisted_streams: &[TokenStream] = if options.store_token_streams {
            &streams
        } else {
            &[]
        };
        if let Err(err) = self.store.put_submission(&set, persisted_streams) {
            finish_span(span, Some(err.to_string()));
            return PipelineOutcome::failed(
                submission,
                report,
                warnings,
                PipelineFailure::new("fingerprintStoreWriteFailed", err.to_string()),
            );
        }
        finish_span(span, None);

        // --- Compare against the step's prior submissions ---
        let span = StageSpan::start(PipelineStage::Compare, sub_id, step_id);
        let peers: Vec<String> = match self.store.peers(step_id) {
            Ok(ids) => ids.into_iter().filter(|id| id != sub_id).collect(),
            Err(err) => {
                warnings.push(PipelineWarning::new(
                    "comparatorFailure",
                    step_id.clone(),
                    format!("peer enumeration failed: {err}"),
                ));
                Vec::new()
            }
        };

        let compared: Vec<Result<SimilarityResult, PipelineWarning>> = pool.install(|| {
            peers
                .par_iter()
                .map(|peer| {
                    if Instant::now() >= deadline {
                        cancelled.store(true, Ordering::Relaxed);
                        return Err(PipelineWarning::new(
                            "comparatorFailure",
                            peer.clone(),
                            "skipped: deadline exceeded",
                        ));
                    }
                    self.compare_one(submission, &set, peer)
                })
                .collect()
        });
        if cancelled.load(Ordering::Relaxed) {
            finish_span(span, Some("deadline exceeded".into()));
            return deadline_failure(submission, report, warnings, options);
        }

        let mut summaries = Vec::new();
        for outcome in compared {
            match outcome {
                Ok(result) => {
                    let peer = if result.submission_a == *sub_id {
                        result.submission_b.clone()
                    } else {
                        result.submission_a.clone()
                    };
                    summaries.push(SimilaritySummary {
                        peer_submission_id: peer,
                        score: result.score,
                        truncated: result.truncated,
                        low_confidence: result.low_confidence,
                        region_count: result.region_count(),
                    });
                }
                Err(warning) => warnings.push(warning),
            }
        }
        finish_span(span, None);

        summaries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.peer_submission_id.cmp(&b.peer_submission_id))
        });
        let alerts: Vec<SimilaritySummary> = summaries
            .iter()
            .filter(|s| s.score >= options.alert_threshold)
            .cloned()
            .collect();

        PipelineOutcome {
            submission_id: sub_id.clone(),
            step_id: step_id.clone(),
            state: PipelineState::Done,
            rule_report: report,
            summaries,
            alerts,
            warnings,
            error: None,
        }
    }

    /// Load one peer, compare, persist. Every failure isolates to the peer.
    fn compare_one(
        &self,
        submission: &SubmissionRef,
        set: &FingerprintSet,
        peer: &str,
    ) -> Result<SimilarityResult, PipelineWarning> {
        let peer_set = self
            .store
            .fingerprint_set(&submission.step_id, peer)
            .map_err(|err| {
                PipelineWarning::new("comparatorFailure", peer, format!("peer load failed: {err}"))
            })?
            .ok_or_else(|| {
                PipelineWarning::new("comparatorFailure", peer, "peer fingerprint set missing")
            })?;

        let result = compare(set, &peer_set, &self.compare_cfg, submission.submitted_at)
            .map_err(|err| PipelineWarning::new("comparatorFailure", peer, err.to_string()))?;

        self.store.put_result(&result).map_err(|err| {
            PipelineWarning::new(
                "comparatorFailure",
                peer,
                format!("result write failed: {err}"),
            )
        })?;
        Ok(result)
    }
}

/// Per-file tokenization output.
struct TokenizeOutput {
    stream: Option<TokenStream>,
    warnings: Vec<PipelineWarning>,
}

impl TokenizeOutput {
    fn skip() -> Self {
        Self {
            stream: None,
            warnings: Vec::new(),
        }
    }

    fn warn(warning: PipelineWarning) -> Self {
        Self {
            stream: None,
            warnings: vec![warning],
        }
    }
}

fn tokenize_one(
    tree: &MaterializedTree,
    entry: &acquire::FileEntry,
    classify_cfg: &ClassifyConfig,
    deadline: Instant,
    cancelled: &AtomicBool,
) -> TokenizeOutput {
    if cancelled.load(Ordering::Relaxed) || Instant::now() >= deadline {
        cancelled.store(true, Ordering::Relaxed);
        return TokenizeOutput::skip();
    }

    let bytes = match tree.read_file(&entry.rel_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            return TokenizeOutput::warn(PipelineWarning::new(
                "tokenizerFailure",
                entry.rel_path.clone(),
                format!("read failed: {err}"),
            ));
        }
    };

    match classify(Path::new(&entry.rel_path), &bytes, entry.size, classify_cfg) {
        FileClass::Binary => TokenizeOutput::skip(),
        FileClass::Oversized { size, cap } => TokenizeOutput::warn(PipelineWarning::new(
            "fileExcluded",
            entry.rel_path.clone(),
            format!("file of {size} bytes exceeds per-file cap of {cap} bytes"),
        )),
        FileClass::Source(language) => {
            let text = String::from_utf8_lossy(&bytes);
            let (stream, downgrade) = tokenize_file(&entry.rel_path, language, &text);
            let warnings = downgrade
                .map(|w| {
                    vec![PipelineWarning::new(
                        "tokenizerFailure",
                        w.path,
                        format!("{} lexer failed, fell back: {}", w.language, w.message),
                    )]
                })
                .unwrap_or_default();
            TokenizeOutput {
                stream: Some(stream),
                warnings,
            }
        }
    }
}

fn deadline_failure(
    submission: &SubmissionRef,
    report: GateReport,
    warnings: Vec<PipelineWarning>,
    options: &PipelineOptions,
) -> PipelineOutcome {
    PipelineOutcome::failed(
        submission,
        report,
        warnings,
        PipelineFailure::new(
            "deadlineExceeded",
            format!("run exceeded deadline of {} ms", options.deadline_ms),
        ),
    )
}

/// Handle for querying a submission's stored artifacts after a run.
pub struct ResultsHandle {
    store: Arc<FingerprintStore>,
    step_id: String,
    submission_id: String,
}

impl ResultsHandle {
    /// The full similarity result against one peer.
    pub fn result(&self, peer: &str) -> Result<Option<SimilarityResult>, StoreError> {
        self.store.result(&self.step_id, &self.submission_id, peer)
    }

    /// Match regions against one peer; empty when no result is stored.
    pub fn match_regions(&self, peer: &str) -> Result<Vec<MatchRegion>, StoreError> {
        Ok(self
            .result(peer)?
            .map(|r| r.regions)
            .unwrap_or_default())
    }

    /// A stored token stream for alignment rendering.
    pub fn token_stream(&self, path: &str) -> Result<Option<TokenStream>, StoreError> {
        self.store.token_stream(&self.submission_id, path)
    }
}

/// Convenience wrapper: build a one-off [`Pipeline`] and run a single
/// submission through it.
pub fn run_pipeline(
    store: Arc<FingerprintStore>,
    acquire_cfg: AcquireConfig,
    submission: &SubmissionRef,
    rules: &[RuleSpec],
    options: &PipelineOptions,
) -> Result<PipelineOutcome, PipelineSetupError> {
    let pipeline = Pipeline::new(store, acquire_cfg, CompareConfig::default())?;
    Ok(pipeline.run(submission, rules, options))
}
