//! Storage backend abstraction for the fingerprint store.
//!
//! The store's logical contract is small: atomic per-key writes, an atomic
//! multi-operation batch (one transaction), ordered prefix scans, and point
//! deletes. Any engine meeting it is acceptable; the bundled backends are a
//! pure-Rust embedded database (redb) and an in-memory map for tests.

use crate::StoreError;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// A single operation inside an atomic batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put(String, Vec<u8>),
    Delete(String),
}

/// Trait for a key-value storage backend.
pub trait StoreBackend: Send + Sync {
    /// Insert or update a key-value pair.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    /// Retrieve a value by key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Delete a key-value pair. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// Apply a batch of puts and deletes in one transaction. Either every
    /// operation lands or none does.
    fn apply(&self, ops: Vec<BatchOp>) -> Result<(), StoreError>;
    /// Visit every key-value pair whose key starts with `prefix`, in
    /// ascending key order.
    fn scan_prefix(
        &self,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
    /// Flush any buffered writes.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Configuration for selecting and building a backend.
#[derive(Clone, Debug, Default)]
pub enum BackendConfig {
    /// Redb embedded database at the given file path. Pure Rust, ACID,
    /// crash-safe; the recommended backend for deployments.
    ///
    /// Requires the `backend-redb` feature (enabled by default).
    Redb { path: String },
    /// In-memory map; useful for tests and ephemeral pipelines.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the backend this configuration describes.
    pub fn build(&self) -> Result<Box<dyn StoreBackend>, StoreError> {
        match self {
            BackendConfig::InMemory => Ok(Box::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Box::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(StoreError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

/// In-memory backend over a `RwLock<BTreeMap>`; ordered keys make prefix
/// scans trivial.
pub struct InMemoryBackend {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBackend for InMemoryBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(guard.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?
            .remove(key);
        Ok(())
    }

    fn apply(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        // One write lock spans the whole batch.
        let mut guard = self
            .records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        for op in ops {
            match op {
                BatchOp::Put(key, value) => {
                    guard.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    guard.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(
        &self,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        for (key, value) in guard.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            visitor(key, value)?;
        }
        Ok(())
    }
}

#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use self::redb::RedbBackend;
