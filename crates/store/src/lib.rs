//! Durable fingerprint store.
//!
//! One logical key-value database holds every persisted artifact of the
//! pipeline:
//!
//! | Key | Value |
//! |---|---|
//! | `fp/{step_id}/{submission_id}` | [`FingerprintSet`] |
//! | `tok/{submission_id}/{path_hash:016x}` | [`TokenStream`] for alignment display |
//! | `sim/{step_id}/{a}/{b}` (`a < b` lexicographic) | [`SimilarityResult`] |
//! | `idx/step/{step_id}` | sorted submission id list for the step |
//! | `meta/schema` | schema sentinel |
//!
//! Values are bincode (standard configuration: little-endian, varint length
//! prefixes) compressed with zstd. The sentinel records the schema version
//! plus the fingerprint parameters `(k, w, seed)` and the token encoding
//! version; opening a store whose sentinel disagrees with the current
//! configuration fails with [`StoreError::SchemaMismatch`] so parameter
//! changes become an explicit migration instead of silent corruption.
//!
//! All writes for one submission go through a single backend transaction:
//! either the whole submission lands or nothing does.

mod backend;
mod migrate;

pub use crate::backend::{BackendConfig, BatchOp, InMemoryBackend, StoreBackend};
#[cfg(feature = "backend-redb")]
pub use crate::backend::RedbBackend;
pub use crate::migrate::{migrate, MigrationReport};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

use compare::SimilarityResult;
use fingerprint::{FingerprintConfig, FingerprintSet};
use tokenize::TokenStream;

/// Bump whenever the persisted value layout changes.
pub const STORE_SCHEMA_VERSION: u16 = 1;

/// Version of the canonical token byte encoding the fingerprints hash over.
pub const TOKEN_ENCODING_VERSION: u16 = 1;

const SCHEMA_KEY: &str = "meta/schema";

/// Errors produced by the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("schema mismatch: store has {found}, code expects {expected}; migrate or clear the store")]
    SchemaMismatch { expected: String, found: String },
    #[error("invalid id segment {segment:?}: must be non-empty and must not contain '/'")]
    InvalidId { segment: String },
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        StoreError::Backend(msg.into())
    }

    fn codec(msg: impl Into<String>) -> Self {
        StoreError::Codec(msg.into())
    }
}

/// Compression codec for stored values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionCodec {
    None,
    #[default]
    Zstd,
}

/// Compression behavior for stored values.
#[derive(Clone, Debug)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Zstd level; 3 balances ratio and speed for fingerprint payloads.
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::Zstd,
            level: 3,
        }
    }
}

impl CompressionConfig {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => {
                zstd::encode_all(data, self.level).map_err(|e| StoreError::codec(e.to_string()))
            }
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => {
                zstd::decode_all(data).map_err(|e| StoreError::codec(e.to_string()))
            }
        }
    }
}

/// Fingerprint parameters pinned by the schema sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaParams {
    pub k: u32,
    pub w: u32,
    pub seed: u64,
}

impl From<&FingerprintConfig> for SchemaParams {
    fn from(cfg: &FingerprintConfig) -> Self {
        Self {
            k: cfg.k as u32,
            w: cfg.w as u32,
            seed: cfg.seed,
        }
    }
}

/// The persisted schema sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct StoreSchema {
    schema_version: u16,
    token_encoding: u16,
    codec: CompressionCodec,
    params: SchemaParams,
}

impl StoreSchema {
    fn render(&self) -> String {
        format!(
            "v{} enc{} codec{:?} k={} w={} seed={:#x}",
            self.schema_version,
            self.token_encoding,
            self.codec,
            self.params.k,
            self.params.w,
            self.params.seed
        )
    }
}

/// Store construction parameters.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    pub compression: CompressionConfig,
    pub params: SchemaParams,
}

impl StoreConfig {
    pub fn in_memory(params: SchemaParams) -> Self {
        Self {
            backend: BackendConfig::in_memory(),
            compression: CompressionConfig::default(),
            params,
        }
    }

    pub fn redb(path: impl Into<String>, params: SchemaParams) -> Self {
        Self {
            backend: BackendConfig::redb(path),
            compression: CompressionConfig::default(),
            params,
        }
    }
}

fn encode<T: Serialize>(value: &T, compression: &CompressionConfig) -> Result<Vec<u8>, StoreError> {
    let raw = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::codec(e.to_string()))?;
    compression.compress(&raw)
}

fn decode<T: DeserializeOwned>(
    bytes: &[u8],
    compression: &CompressionConfig,
) -> Result<T, StoreError> {
    let raw = compression.decompress(bytes)?;
    let (value, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
        .map_err(|e| StoreError::codec(e.to_string()))?;
    Ok(value)
}

fn validate_segment(segment: &str) -> Result<(), StoreError> {
    if segment.is_empty() || segment.contains('/') {
        return Err(StoreError::InvalidId {
            segment: segment.to_string(),
        });
    }
    Ok(())
}

fn fp_key(step_id: &str, submission_id: &str) -> String {
    format!("fp/{step_id}/{submission_id}")
}

fn tok_prefix(submission_id: &str) -> String {
    format!("tok/{submission_id}/")
}

fn tok_key(submission_id: &str, path: &str) -> String {
    format!("tok/{submission_id}/{:016x}", xxh3_64(path.as_bytes()))
}

fn sim_key(step_id: &str, a: &str, b: &str) -> String {
    // Canonical ordering: the lexicographically smaller id comes first.
    if a <= b {
        format!("sim/{step_id}/{a}/{b}")
    } else {
        format!("sim/{step_id}/{b}/{a}")
    }
}

fn sim_prefix(step_id: &str) -> String {
    format!("sim/{step_id}/")
}

fn idx_key(step_id: &str) -> String {
    format!("idx/step/{step_id}")
}

/// The durable fingerprint store: owns persisted pipeline artifacts.
pub struct FingerprintStore {
    backend: Box<dyn StoreBackend>,
    compression: CompressionConfig,
    params: SchemaParams,
}

impl FingerprintStore {
    /// Open (or initialize) a store and verify its schema sentinel.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let backend = config.backend.build()?;
        let expected = StoreSchema {
            schema_version: STORE_SCHEMA_VERSION,
            token_encoding: TOKEN_ENCODING_VERSION,
            codec: config.compression.codec,
            params: config.params,
        };

        match backend.get(SCHEMA_KEY)? {
            Some(bytes) => {
                // The sentinel is stored uncompressed so it stays readable
                // before the codec is known.
                let (found, _): (StoreSchema, _) =
                    bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(|e| StoreError::codec(e.to_string()))?;
                if found != expected {
                    return Err(StoreError::SchemaMismatch {
                        expected: expected.render(),
                        found: found.render(),
                    });
                }
            }
            None => {
                let bytes =
                    bincode::serde::encode_to_vec(&expected, bincode::config::standard())
                        .map_err(|e| StoreError::codec(e.to_string()))?;
                backend.put(SCHEMA_KEY, &bytes)?;
            }
        }

        Ok(Self {
            backend,
            compression: config.compression,
            params: config.params,
        })
    }

    /// The fingerprint parameters this store is pinned to.
    pub fn params(&self) -> SchemaParams {
        self.params
    }

    /// Persist a submission's fingerprint set plus optional token streams in
    /// one atomic batch. Re-running the same submission id first clears its
    /// stale keys inside the same transaction, making the pipeline
    /// idempotent per submission id.
    pub fn put_submission(
        &self,
        set: &FingerprintSet,
        streams: &[TokenStream],
    ) -> Result<(), StoreError> {
        validate_segment(&set.step_id)?;
        validate_segment(&set.submission_id)?;

        let mut ops = Vec::new();

        // Stale token streams from a previous run of this submission id.
        let prefix = tok_prefix(&set.submission_id);
        let mut stale = Vec::new();
        self.backend.scan_prefix(&prefix, &mut |key, _| {
            stale.push(key.to_string());
            Ok(())
        })?;
        ops.extend(stale.into_iter().map(BatchOp::Delete));

        ops.push(BatchOp::Put(
            fp_key(&set.step_id, &set.submission_id),
            encode(set, &self.compression)?,
        ));
        for stream in streams {
            ops.push(BatchOp::Put(
                tok_key(&set.submission_id, &stream.path),
                encode(stream, &self.compression)?,
            ));
        }

        let mut index = self.peers(&set.step_id)?;
        if let Err(pos) = index.binary_search(&set.submission_id) {
            index.insert(pos, set.submission_id.clone());
        }
        ops.push(BatchOp::Put(
            idx_key(&set.step_id),
            encode(&index, &self.compression)?,
        ));

        self.backend.apply(ops)
    }

    /// Load one submission's fingerprint set.
    pub fn fingerprint_set(
        &self,
        step_id: &str,
        submission_id: &str,
    ) -> Result<Option<FingerprintSet>, StoreError> {
        match self.backend.get(&fp_key(step_id, submission_id))? {
            Some(bytes) => Ok(Some(decode(&bytes, &self.compression)?)),
            None => Ok(None),
        }
    }

    /// Submission ids present for a step, sorted ascending. O(count); no
    /// payloads are touched.
    pub fn peers(&self, step_id: &str) -> Result<Vec<String>, StoreError> {
        match self.backend.get(&idx_key(step_id))? {
            Some(bytes) => decode(&bytes, &self.compression),
            None => Ok(Vec::new()),
        }
    }

    /// Persist one similarity result under its canonical key.
    pub fn put_result(&self, result: &SimilarityResult) -> Result<(), StoreError> {
        validate_segment(&result.step_id)?;
        validate_segment(&result.submission_a)?;
        validate_segment(&result.submission_b)?;
        let key = sim_key(&result.step_id, &result.submission_a, &result.submission_b);
        self.backend.put(&key, &encode(result, &self.compression)?)
    }

    /// Load the similarity result for a pair, in either argument order.
    pub fn result(
        &self,
        step_id: &str,
        a: &str,
        b: &str,
    ) -> Result<Option<SimilarityResult>, StoreError> {
        match self.backend.get(&sim_key(step_id, a, b))? {
            Some(bytes) => Ok(Some(decode(&bytes, &self.compression)?)),
            None => Ok(None),
        }
    }

    /// Every stored result in which the submission participates.
    pub fn results_for(
        &self,
        step_id: &str,
        submission_id: &str,
    ) -> Result<Vec<SimilarityResult>, StoreError> {
        let mut out = Vec::new();
        let compression = &self.compression;
        self.backend
            .scan_prefix(&sim_prefix(step_id), &mut |_, bytes| {
                let result: SimilarityResult = decode(bytes, compression)?;
                if result.submission_a == submission_id || result.submission_b == submission_id {
                    out.push(result);
                }
                Ok(())
            })?;
        Ok(out)
    }

    /// Load one stored token stream by file path.
    pub fn token_stream(
        &self,
        submission_id: &str,
        path: &str,
    ) -> Result<Option<TokenStream>, StoreError> {
        match self.backend.get(&tok_key(submission_id, path))? {
            Some(bytes) => Ok(Some(decode(&bytes, &self.compression)?)),
            None => Ok(None),
        }
    }

    /// Delete a submission and everything derived from it: its fingerprint
    /// set, token streams, every similarity result it participates in, and
    /// its step-index entry. Result cleanup is best-effort when the peer is
    /// already gone; the batch still applies atomically.
    pub fn delete_submission(&self, step_id: &str, submission_id: &str) -> Result<(), StoreError> {
        validate_segment(step_id)?;
        validate_segment(submission_id)?;

        let mut ops = vec![BatchOp::Delete(fp_key(step_id, submission_id))];

        let mut tok_keys = Vec::new();
        self.backend
            .scan_prefix(&tok_prefix(submission_id), &mut |key, _| {
                tok_keys.push(key.to_string());
                Ok(())
            })?;
        ops.extend(tok_keys.into_iter().map(BatchOp::Delete));

        let mut sim_keys = Vec::new();
        self.backend
            .scan_prefix(&sim_prefix(step_id), &mut |key, _| {
                let mut parts = key.rsplitn(3, '/');
                let b = parts.next().unwrap_or_default();
                let a = parts.next().unwrap_or_default();
                if a == submission_id || b == submission_id {
                    sim_keys.push(key.to_string());
                }
                Ok(())
            })?;
        ops.extend(sim_keys.into_iter().map(BatchOp::Delete));

        let mut index = self.peers(step_id)?;
        index.retain(|id| id != submission_id);
        if index.is_empty() {
            ops.push(BatchOp::Delete(idx_key(step_id)));
        } else {
            ops.push(BatchOp::Put(
                idx_key(step_id),
                encode(&index, &self.compression)?,
            ));
        }

        self.backend.apply(ops)
    }

    /// Raw value bytes for a submission's fingerprint key; used by tests to
    /// assert byte-level idempotence.
    pub fn raw_fingerprint_bytes(
        &self,
        step_id: &str,
        submission_id: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.backend.get(&fp_key(step_id, submission_id))
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.backend.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use fingerprint::{FileFingerprints, Fingerprint};
    use tokenize::{Language, Token, TokenKind};

    fn params() -> SchemaParams {
        SchemaParams {
            k: 5,
            w: 7,
            seed: 0xABCD,
        }
    }

    fn open_memory() -> FingerprintStore {
        FingerprintStore::open(StoreConfig::in_memory(params())).unwrap()
    }

    fn sample_set(sub: &str, step: &str) -> FingerprintSet {
        let mut set = FingerprintSet::new(sub, step, 5);
        set.insert_file(FileFingerprints {
            path: "main.py".into(),
            fingerprints: vec![
                Fingerprint {
                    hash: 11,
                    pos: 0,
                    start: 0,
                    end: 20,
                },
                Fingerprint {
                    hash: 22,
                    pos: 4,
                    start: 15,
                    end: 40,
                },
            ],
        });
        set
    }

    fn sample_stream() -> TokenStream {
        TokenStream {
            path: "main.py".into(),
            language: Language::Python,
            tokens: vec![
                Token::new(TokenKind::Keyword, "def", 0, 3),
                Token::new(TokenKind::Ident, "IDENT", 4, 9),
            ],
        }
    }

    fn sample_result(step: &str, a: &str, b: &str) -> SimilarityResult {
        SimilarityResult {
            submission_a: a.min(b).to_string(),
            submission_b: a.max(b).to_string(),
            step_id: step.to_string(),
            score: 0.42,
            regions: Vec::new(),
            truncated: false,
            low_confidence: false,
            compared_at: DateTime::parse_from_rfc3339("2025-03-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn fingerprint_set_roundtrip() {
        let store = open_memory();
        let set = sample_set("sub-1", "step-1");
        store.put_submission(&set, &[sample_stream()]).unwrap();

        let loaded = store.fingerprint_set("step-1", "sub-1").unwrap().unwrap();
        assert_eq!(loaded, set);
    }

    #[test]
    fn token_stream_roundtrip() {
        let store = open_memory();
        let set = sample_set("sub-1", "step-1");
        let stream = sample_stream();
        store.put_submission(&set, &[stream.clone()]).unwrap();

        let loaded = store.token_stream("sub-1", "main.py").unwrap().unwrap();
        assert_eq!(loaded, stream);
        assert!(store.token_stream("sub-1", "other.py").unwrap().is_none());
    }

    #[test]
    fn step_index_tracks_submissions_sorted() {
        let store = open_memory();
        store
            .put_submission(&sample_set("sub-b", "step-1"), &[])
            .unwrap();
        store
            .put_submission(&sample_set("sub-a", "step-1"), &[])
            .unwrap();
        store
            .put_submission(&sample_set("sub-c", "step-2"), &[])
            .unwrap();

        assert_eq!(store.peers("step-1").unwrap(), vec!["sub-a", "sub-b"]);
        assert_eq!(store.peers("step-2").unwrap(), vec!["sub-c"]);
        assert!(store.peers("step-9").unwrap().is_empty());
    }

    #[test]
    fn rerun_is_byte_idempotent_and_clears_stale_streams() {
        let store = open_memory();
        let set = sample_set("sub-1", "step-1");

        let old_stream = TokenStream {
            path: "old.py".into(),
            language: Language::Python,
            tokens: vec![],
        };
        store.put_submission(&set, &[old_stream]).unwrap();
        let first = store.raw_fingerprint_bytes("step-1", "sub-1").unwrap();

        store.put_submission(&set, &[sample_stream()]).unwrap();
        let second = store.raw_fingerprint_bytes("step-1", "sub-1").unwrap();

        assert_eq!(first, second);
        assert!(store.token_stream("sub-1", "old.py").unwrap().is_none());
        assert!(store.token_stream("sub-1", "main.py").unwrap().is_some());
        assert_eq!(store.peers("step-1").unwrap(), vec!["sub-1"]);
    }

    #[test]
    fn results_store_canonically_in_either_order() {
        let store = open_memory();
        let result = sample_result("step-1", "sub-b", "sub-a");
        store.put_result(&result).unwrap();

        let via_ab = store.result("step-1", "sub-a", "sub-b").unwrap().unwrap();
        let via_ba = store.result("step-1", "sub-b", "sub-a").unwrap().unwrap();
        assert_eq!(via_ab, via_ba);
        assert_eq!(via_ab.submission_a, "sub-a");
    }

    #[test]
    fn results_for_filters_by_participant() {
        let store = open_memory();
        store.put_result(&sample_result("step-1", "sub-a", "sub-b")).unwrap();
        store.put_result(&sample_result("step-1", "sub-b", "sub-c")).unwrap();
        store.put_result(&sample_result("step-1", "sub-c", "sub-d")).unwrap();

        let for_b = store.results_for("step-1", "sub-b").unwrap();
        assert_eq!(for_b.len(), 2);
        let for_e = store.results_for("step-1", "sub-e").unwrap();
        assert!(for_e.is_empty());
    }

    #[test]
    fn delete_cascades_everything() {
        let store = open_memory();
        store
            .put_submission(&sample_set("sub-a", "step-1"), &[sample_stream()])
            .unwrap();
        store
            .put_submission(&sample_set("sub-b", "step-1"), &[])
            .unwrap();
        store.put_result(&sample_result("step-1", "sub-a", "sub-b")).unwrap();

        store.delete_submission("step-1", "sub-a").unwrap();

        assert!(store.fingerprint_set("step-1", "sub-a").unwrap().is_none());
        assert!(store.token_stream("sub-a", "main.py").unwrap().is_none());
        assert!(store.result("step-1", "sub-a", "sub-b").unwrap().is_none());
        assert_eq!(store.peers("step-1").unwrap(), vec!["sub-b"]);

        // The peer's artifacts are untouched.
        assert!(store.fingerprint_set("step-1", "sub-b").unwrap().is_some());
    }

    #[test]
    fn deleting_last_submission_drops_the_index() {
        let store = open_memory();
        store
            .put_submission(&sample_set("sub-a", "step-1"), &[])
            .unwrap();
        store.delete_submission("step-1", "sub-a").unwrap();
        assert!(store.peers("step-1").unwrap().is_empty());
    }

    #[test]
    fn ids_with_separators_are_rejected() {
        let store = open_memory();
        let set = sample_set("bad/id", "step-1");
        assert!(matches!(
            store.put_submission(&set, &[]),
            Err(StoreError::InvalidId { .. })
        ));
    }

    #[cfg(feature = "backend-redb")]
    #[test]
    fn schema_mismatch_detected_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.redb");
        let path_str = path.to_string_lossy().to_string();

        {
            let store =
                FingerprintStore::open(StoreConfig::redb(path_str.clone(), params())).unwrap();
            store
                .put_submission(&sample_set("sub-1", "step-1"), &[])
                .unwrap();
        }

        // Same parameters reopen cleanly.
        {
            let store =
                FingerprintStore::open(StoreConfig::redb(path_str.clone(), params())).unwrap();
            assert!(store.fingerprint_set("step-1", "sub-1").unwrap().is_some());
        }

        // Changed winnowing parameters must be refused.
        let other = SchemaParams { w: 9, ..params() };
        let err = FingerprintStore::open(StoreConfig::redb(path_str, other)).unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));
    }
}
