//! Winnowing fingerprinter for canonical token streams.
//!
//! Given a token stream, this crate forms k-grams of canonical token
//! encodings, hashes them with a seeded rolling hash, and winnows the hash
//! sequence down to a compact set of [`Fingerprint`]s that is deterministic,
//! rename-invariant, and dense enough (about `2n / (w + 1)` selections) to
//! detect any shared substring of `w + k - 1` or more tokens.
//!
//! The fingerprint space is defined by `(k, w, seed)` plus the canonical
//! token byte encoding; all of them are recorded in the store's schema
//! sentinel.

mod config;
mod winnow;

pub use crate::config::{
    FingerprintConfig, FingerprintError, DEFAULT_K, DEFAULT_SEED, DEFAULT_W,
};
pub use crate::winnow::{kgram_hashes, splitmix64, winnow, Selection};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use tokenize::TokenStream;

/// A selected fingerprint: k-gram hash, k-gram position, and the byte-span
/// union of the k tokens it covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    /// 64-bit rolling hash of the k-gram.
    pub hash: u64,
    /// Index of the k-gram in the token stream (== index of its first token).
    pub pos: u32,
    /// Byte offset of the first covered token.
    pub start: u32,
    /// Byte offset one past the last covered token.
    pub end: u32,
}

/// Fingerprints for one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileFingerprints {
    pub path: String,
    pub fingerprints: Vec<Fingerprint>,
}

/// The complete fingerprint artifact for one submission, partitioned by
/// file. Persisted read-only in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FingerprintSet {
    pub submission_id: String,
    pub step_id: String,
    /// k-gram size the fingerprints were produced with; carried so the
    /// comparator can reconstruct token lengths without the config.
    pub k: u32,
    /// Per-file fingerprint lists, keyed by repository-relative path.
    /// BTreeMap keeps serialization and iteration order stable.
    pub files: BTreeMap<String, Vec<Fingerprint>>,
    /// Total fingerprint count across files.
    pub fingerprint_count: u64,
}

impl FingerprintSet {
    pub fn new(submission_id: impl Into<String>, step_id: impl Into<String>, k: u32) -> Self {
        Self {
            submission_id: submission_id.into(),
            step_id: step_id.into(),
            k,
            files: BTreeMap::new(),
            fingerprint_count: 0,
        }
    }

    /// Add one file's fingerprints. Re-adding a path replaces it.
    pub fn insert_file(&mut self, file: FileFingerprints) {
        self.files.insert(file.path, file.fingerprints);
        self.fingerprint_count = self.files.values().map(|f| f.len() as u64).sum();
    }

    /// Number of distinct hashes across all files.
    pub fn unique_hashes(&self) -> usize {
        let mut set = std::collections::HashSet::new();
        for fps in self.files.values() {
            for fp in fps {
                set.insert(fp.hash);
            }
        }
        set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprint_count == 0
    }
}

/// Fingerprint a single token stream.
///
/// Streams shorter than `k` tokens produce an empty list (zero k-grams),
/// which is the correct boundary behavior for trivial files.
pub fn fingerprint_stream(stream: &TokenStream, cfg: &FingerprintConfig) -> FileFingerprints {
    let tokens = &stream.tokens;
    let hashes = kgram_hashes(tokens, cfg.k, cfg.seed);
    let selections = winnow(&hashes, cfg.w);

    let fingerprints = selections
        .into_iter()
        .map(|sel| {
            let first = &tokens[sel.pos];
            let last = &tokens[sel.pos + cfg.k - 1];
            Fingerprint {
                hash: sel.hash,
                pos: sel.pos as u32,
                start: first.start,
                end: last.end,
            }
        })
        .collect();

    FileFingerprints {
        path: stream.path.clone(),
        fingerprints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenize::{tokenize_file, Language};

    fn stream(path: &str, source: &str) -> TokenStream {
        let (stream, warning) = tokenize_file(path, Language::Python, source);
        assert!(warning.is_none());
        stream
    }

    const SAMPLE: &str = "def total(items):\n    acc = 0\n    for item in items:\n        acc = acc + item\n    return acc\n";

    #[test]
    fn fingerprints_are_deterministic() {
        let cfg = FingerprintConfig::default();
        let s = stream("a.py", SAMPLE);
        let one = fingerprint_stream(&s, &cfg);
        let two = fingerprint_stream(&s, &cfg);
        assert_eq!(one, two);
        assert!(!one.fingerprints.is_empty());
    }

    #[test]
    fn rename_invariance() {
        let cfg = FingerprintConfig::default();
        let a = fingerprint_stream(&stream("a.py", SAMPLE), &cfg);
        let renamed = SAMPLE
            .replace("total", "sum_up")
            .replace("items", "xs")
            .replace("acc", "t")
            .replace("item", "x");
        let b = fingerprint_stream(&stream("b.py", &renamed), &cfg);
        let hashes_a: Vec<u64> = a.fingerprints.iter().map(|f| f.hash).collect();
        let hashes_b: Vec<u64> = b.fingerprints.iter().map(|f| f.hash).collect();
        assert_eq!(hashes_a, hashes_b);
    }

    #[test]
    fn streams_shorter_than_k_produce_nothing() {
        let cfg = FingerprintConfig::default();
        let s = stream("tiny.py", "x");
        let file = fingerprint_stream(&s, &cfg);
        assert!(file.fingerprints.is_empty());
    }

    #[test]
    fn spans_lie_within_the_source() {
        let cfg = FingerprintConfig::default();
        let s = stream("a.py", SAMPLE);
        let file = fingerprint_stream(&s, &cfg);
        for fp in &file.fingerprints {
            assert!(fp.start < fp.end);
            assert!((fp.end as usize) <= SAMPLE.len());
            // The span must cover exactly the k tokens starting at pos.
            let first = &s.tokens[fp.pos as usize];
            let last = &s.tokens[fp.pos as usize + cfg.k - 1];
            assert_eq!(fp.start, first.start);
            assert_eq!(fp.end, last.end);
        }
    }

    #[test]
    fn fingerprint_density_near_two_over_w_plus_one() {
        let cfg = FingerprintConfig::default();
        let big: String = (0..200)
            .map(|i| format!("v{i} = v{i} + {i}\n"))
            .collect();
        let s = stream("big.py", &big);
        let file = fingerprint_stream(&s, &cfg);
        let n = s.tokens.len() as f64;
        let expected = 2.0 * n / (cfg.w as f64 + 1.0);
        let actual = file.fingerprints.len() as f64;
        assert!(
            actual > expected * 0.4 && actual < expected * 2.0,
            "expected ~{expected}, got {actual}"
        );
    }

    #[test]
    fn set_counts_and_unique_hashes() {
        let cfg = FingerprintConfig::default();
        let mut set = FingerprintSet::new("sub-1", "step-1", cfg.k as u32);
        set.insert_file(fingerprint_stream(&stream("a.py", SAMPLE), &cfg));
        set.insert_file(fingerprint_stream(&stream("b.py", "x = 1\ny = 2\nz = x + y\n"), &cfg));
        assert_eq!(
            set.fingerprint_count,
            set.files.values().map(|f| f.len() as u64).sum::<u64>()
        );
        assert!(set.unique_hashes() > 0);
        assert!(!set.is_empty());
    }

    #[test]
    fn reinserting_a_file_replaces_it() {
        let cfg = FingerprintConfig::default();
        let mut set = FingerprintSet::new("sub-1", "step-1", cfg.k as u32);
        set.insert_file(fingerprint_stream(&stream("a.py", SAMPLE), &cfg));
        let before = set.fingerprint_count;
        set.insert_file(fingerprint_stream(&stream("a.py", SAMPLE), &cfg));
        assert_eq!(set.fingerprint_count, before);
        assert_eq!(set.files.len(), 1);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = FingerprintConfig::default();
        let mut set = FingerprintSet::new("sub-1", "step-1", cfg.k as u32);
        set.insert_file(fingerprint_stream(&stream("a.py", SAMPLE), &cfg));
        let json = serde_json::to_string(&set).unwrap();
        let back: FingerprintSet = serde_json::from_str(&json).unwrap();
        assert_eq!(set, back);
    }
}
