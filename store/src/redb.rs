//! Redb-based persistent document store implementation.
//!
//! Rows live in a single table keyed `{collection}:{key}`; collection
//! names must not contain `:` (document keys may). Values are JSON bytes.

use std::path::Path;

use ::redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;

use crate::{apply_increment, apply_push, generated_key, Doc, DocStore, Filter, StoreError, StoreResult};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("docs");

/// A persistent document store backed by redb.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a redb store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = Database::create(path).map_err(|e| StoreError::Storage(e.to_string()))?;

        // Create the table if it doesn't exist.
        let tx = db
            .begin_write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        {
            let _ = tx
                .open_table(TABLE)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        tx.commit().map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(Self { db })
    }

    fn row_key(collection: &str, key: &str) -> String {
        format!("{collection}:{key}")
    }

    fn row_prefix(collection: &str) -> String {
        format!("{collection}:")
    }

    fn decode(bytes: &[u8]) -> StoreResult<Value> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn encode(value: &Value) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Scan a collection, returning `(key, value)` rows in key order.
    fn scan(&self, collection: &str) -> StoreResult<Vec<(String, Value)>> {
        let prefix = Self::row_prefix(collection);
        let tx = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let table = tx
            .open_table(TABLE)
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let mut rows = Vec::new();
        for item in table.iter().map_err(|e| StoreError::Storage(e.to_string()))? {
            let (key, value) = item.map_err(|e| StoreError::Storage(e.to_string()))?;
            let key_str = key.value();
            if let Some(doc_key) = key_str.strip_prefix(&prefix) {
                rows.push((doc_key.to_string(), Self::decode(value.value())?));
            }
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    fn write(&self, collection: &str, key: &str, value: &Value) -> StoreResult<()> {
        let bytes = Self::encode(value)?;
        let tx = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        {
            let mut table = tx
                .open_table(TABLE)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            table
                .insert(Self::row_key(collection, key).as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        tx.commit().map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(())
    }

    fn read(&self, collection: &str, key: &str) -> StoreResult<Option<Value>> {
        let tx = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let table = tx
            .open_table(TABLE)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        match table
            .get(Self::row_key(collection, key).as_str())
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            Some(value) => Ok(Some(Self::decode(value.value())?)),
            None => Ok(None),
        }
    }
}

impl DocStore for RedbStore {
    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Doc>> {
        Ok(self
            .scan(collection)?
            .into_iter()
            .filter(|(_, value)| filter.matches(value))
            .map(|(key, value)| Doc { key, value })
            .collect())
    }

    fn upsert(&self, collection: &str, key: &str, value: Value) -> StoreResult<()> {
        self.write(collection, key, &value)
    }

    fn insert(&self, collection: &str, value: Value) -> StoreResult<String> {
        let key = generated_key();
        self.write(collection, &key, &value)?;
        Ok(key)
    }

    fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<usize> {
        let doomed: Vec<String> = self
            .scan(collection)?
            .into_iter()
            .filter(|(_, value)| filter.matches(value))
            .map(|(key, _)| Self::row_key(collection, &key))
            .collect();

        let tx = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        {
            let mut table = tx
                .open_table(TABLE)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            for row_key in &doomed {
                table
                    .remove(row_key.as_str())
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
            }
        }
        tx.commit().map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(doomed.len())
    }

    fn push(&self, collection: &str, key: &str, field: &str, value: Value) -> StoreResult<()> {
        let mut doc = self
            .read(collection, key)?
            .unwrap_or_else(|| Value::Object(Default::default()));
        apply_push(&mut doc, field, value)?;
        self.write(collection, key, &doc)
    }

    fn increment(&self, collection: &str, key: &str, field: &str, n: i64) -> StoreResult<()> {
        let mut doc = self
            .read(collection, key)?
            .unwrap_or_else(|| Value::Object(Default::default()));
        apply_increment(&mut doc, field, n)?;
        self.write(collection, key, &doc)
    }
}
