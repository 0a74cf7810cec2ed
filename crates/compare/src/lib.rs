//! Pairwise comparison of fingerprint sets.
//!
//! Given two [`FingerprintSet`](fingerprint::FingerprintSet)s from the same
//! assignment step, this crate produces a [`SimilarityResult`]: a score in
//! `[0, 1]` plus the list of [`MatchRegion`]s that explain it, mapped back
//! to byte spans in the originating files.
//!
//! # Scoring
//!
//! `score = |shared hashes| / max(|unique(A)|, |unique(B)|)` — a
//! containment-style Jaccard variant. Padding either submission with
//! unrelated code cannot raise the score, and a verbatim copy embedded in a
//! larger submission still surfaces.
//!
//! # Determinism
//!
//! Results are canonical (smaller submission id on the A side) and
//! deterministic: the same pair of fingerprint sets always produces the
//! same payload, which the store relies on for idempotent re-runs.

mod engine;
mod types;

pub use crate::engine::compare;
pub use crate::types::{CompareConfig, CompareError, MatchRegion, SimilarityResult};
