//! Redb (Rust embedded database) backend for the fingerprint store.
//!
//! Redb provides ACID transactions with MVCC and is crash-safe by default,
//! which is exactly what the store contract requires: a failed batch leaves
//! the database untouched. All keys live in one table; the logical key
//! layout (`fp/`, `tok/`, `sim/`, `idx/`, `meta/`) is handled above this
//! layer.

use crate::backend::{BatchOp, StoreBackend};
use crate::StoreError;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const STORE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("simscan_store");

/// Redb backend; `Arc<Database>` makes the handle cheap to share across
/// worker threads while redb does its own internal locking.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::backend(e.to_string()))?;

        // Opening the table inside a committed write txn creates it.
        let write_txn = db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let _table = write_txn
                .open_table(STORE_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl StoreBackend for RedbBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.apply(vec![BatchOp::Put(key.to_string(), value.to_vec())])
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let table = read_txn
            .open_table(STORE_TABLE)
            .map_err(|e| StoreError::backend(e.to_string()))?;
        match table
            .get(key)
            .map_err(|e| StoreError::backend(e.to_string()))?
        {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.apply(vec![BatchOp::Delete(key.to_string())])
    }

    fn apply(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(STORE_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            for op in &ops {
                match op {
                    BatchOp::Put(key, value) => {
                        table
                            .insert(key.as_str(), value.as_slice())
                            .map_err(|e| StoreError::backend(e.to_string()))?;
                    }
                    BatchOp::Delete(key) => {
                        table
                            .remove(key.as_str())
                            .map_err(|e| StoreError::backend(e.to_string()))?;
                    }
                }
            }
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }

    fn scan_prefix(
        &self,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let table = read_txn
            .open_table(STORE_TABLE)
            .map_err(|e| StoreError::backend(e.to_string()))?;

        for item in table
            .range(prefix..)
            .map_err(|e| StoreError::backend(e.to_string()))?
        {
            let (key, value) = item.map_err(|e| StoreError::backend(e.to_string()))?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            visitor(key, value.value())?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        // Redb commits are synchronous; every batch is already durable.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn redb_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.put("key1", b"value1").unwrap();
        assert_eq!(backend.get("key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(backend.get("nonexistent").unwrap(), None);

        backend.delete("key1").unwrap();
        assert_eq!(backend.get("key1").unwrap(), None);
    }

    #[test]
    fn redb_batch_is_atomic_per_commit() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend
            .apply(vec![
                BatchOp::Put("a".into(), b"1".to_vec()),
                BatchOp::Put("b".into(), b"2".to_vec()),
                BatchOp::Delete("a".into()),
            ])
            .unwrap();

        assert_eq!(backend.get("a").unwrap(), None);
        assert_eq!(backend.get("b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn redb_prefix_scan() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.put("fp/s1/a", b"1").unwrap();
        backend.put("fp/s1/b", b"2").unwrap();
        backend.put("fp/s2/c", b"3").unwrap();

        let mut keys = Vec::new();
        backend
            .scan_prefix("fp/s1/", &mut |key, _| {
                keys.push(key.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(keys, vec!["fp/s1/a", "fp/s1/b"]);
    }

    #[test]
    fn redb_persists_across_reopen() {
        let temp_file = NamedTempFile::new().unwrap();
        {
            let backend = RedbBackend::open(temp_file.path()).unwrap();
            backend.put("durable", b"yes").unwrap();
        }
        let backend = RedbBackend::open(temp_file.path()).unwrap();
        assert_eq!(backend.get("durable").unwrap(), Some(b"yes".to_vec()));
    }
}
