//! Store migration: rewrite persisted artifacts when the fingerprint
//! parameters or value encoding change.
//!
//! A store is pinned to `(k, w, seed)` plus the codec recorded in its
//! schema sentinel. Opening with different parameters fails; migration is
//! the explicit path forward. Fingerprint sets are rebuilt from the stored
//! token streams (files whose streams were not persisted are dropped and
//! counted), similarity results are deleted wholesale since they are stale
//! under the new parameters, and every surviving value is re-encoded with
//! the new codec. The rewrite lands in one backend transaction, so an
//! interrupted migration leaves the old store intact.

use fingerprint::{fingerprint_stream, FingerprintConfig, FingerprintSet};
use tokenize::TokenStream;

use crate::backend::BatchOp;
use crate::{
    decode, encode, tok_key, CompressionConfig, StoreConfig, StoreError, StoreSchema,
    SCHEMA_KEY, STORE_SCHEMA_VERSION, TOKEN_ENCODING_VERSION,
};

/// What a migration touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Fingerprint sets rebuilt under the new parameters.
    pub migrated_submissions: usize,
    /// Files re-fingerprinted from their stored token streams.
    pub refingerprinted_files: usize,
    /// Files dropped because no token stream was persisted for them.
    pub dropped_files: usize,
    /// Similarity results deleted as stale.
    pub deleted_results: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        *self == MigrationReport::default()
    }
}

/// Migrate a store in place to the parameters and codec in `config`.
///
/// A fresh or already-current store is a no-op. After a successful
/// migration, [`crate::FingerprintStore::open`] with the same `config`
/// succeeds.
pub fn migrate(config: &StoreConfig) -> Result<MigrationReport, StoreError> {
    let backend = config.backend.build()?;
    let target = StoreSchema {
        schema_version: STORE_SCHEMA_VERSION,
        token_encoding: TOKEN_ENCODING_VERSION,
        codec: config.compression.codec,
        params: config.params,
    };

    let found = match backend.get(SCHEMA_KEY)? {
        Some(bytes) => {
            let (schema, _): (StoreSchema, _) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                    .map_err(|e| StoreError::Codec(e.to_string()))?;
            schema
        }
        None => {
            // Nothing to rewrite; stamp the sentinel and stop.
            let bytes = bincode::serde::encode_to_vec(&target, bincode::config::standard())
                .map_err(|e| StoreError::Codec(e.to_string()))?;
            backend.put(SCHEMA_KEY, &bytes)?;
            return Ok(MigrationReport::default());
        }
    };
    if found == target {
        return Ok(MigrationReport::default());
    }

    let old_compression = CompressionConfig {
        codec: found.codec,
        level: config.compression.level,
    };
    let new_compression = &config.compression;
    let fp_cfg = FingerprintConfig {
        version: 1,
        k: config.params.k as usize,
        w: config.params.w as usize,
        seed: config.params.seed,
    };
    fp_cfg
        .validate()
        .map_err(|e| StoreError::Codec(format!("invalid target parameters: {e}")))?;

    let mut report = MigrationReport::default();
    let mut ops: Vec<BatchOp> = Vec::new();

    // Rebuild every fingerprint set from its persisted token streams.
    let mut fp_entries: Vec<(String, Vec<u8>)> = Vec::new();
    backend.scan_prefix("fp/", &mut |key, value| {
        fp_entries.push((key.to_string(), value.to_vec()));
        Ok(())
    })?;
    for (key, value) in fp_entries {
        let old_set: FingerprintSet = decode(&value, &old_compression)?;
        let mut new_set = FingerprintSet::new(
            old_set.submission_id.clone(),
            old_set.step_id.clone(),
            config.params.k,
        );
        for path in old_set.files.keys() {
            match backend.get(&tok_key(&old_set.submission_id, path))? {
                Some(stream_bytes) => {
                    let stream: TokenStream = decode(&stream_bytes, &old_compression)?;
                    new_set.insert_file(fingerprint_stream(&stream, &fp_cfg));
                    report.refingerprinted_files += 1;
                    ops.push(BatchOp::Put(
                        tok_key(&old_set.submission_id, path),
                        encode(&stream, new_compression)?,
                    ));
                }
                None => {
                    report.dropped_files += 1;
                }
            }
        }
        ops.push(BatchOp::Put(key, encode(&new_set, new_compression)?));
        report.migrated_submissions += 1;
    }

    // Similarity results are meaningless under the new parameters.
    let mut sim_keys: Vec<String> = Vec::new();
    backend.scan_prefix("sim/", &mut |key, _| {
        sim_keys.push(key.to_string());
        Ok(())
    })?;
    report.deleted_results = sim_keys.len();
    ops.extend(sim_keys.into_iter().map(BatchOp::Delete));

    // Step indexes survive; re-encode them with the new codec.
    let mut idx_entries: Vec<(String, Vec<u8>)> = Vec::new();
    backend.scan_prefix("idx/step/", &mut |key, value| {
        idx_entries.push((key.to_string(), value.to_vec()));
        Ok(())
    })?;
    for (key, value) in idx_entries {
        let index: Vec<String> = decode(&value, &old_compression)?;
        ops.push(BatchOp::Put(key, encode(&index, new_compression)?));
    }

    let sentinel = bincode::serde::encode_to_vec(&target, bincode::config::standard())
        .map_err(|e| StoreError::Codec(e.to_string()))?;
    ops.push(BatchOp::Put(SCHEMA_KEY.to_string(), sentinel));

    backend.apply(ops)?;
    Ok(report)
}
