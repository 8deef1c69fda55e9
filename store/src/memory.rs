//! In-memory document store implementation for testing and live state.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::{apply_increment, apply_push, generated_key, Doc, DocStore, Filter, StoreError, StoreResult};

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// An in-memory document store backed by per-collection BTreeMaps, so
/// `find` returns documents in key order just like the persistent
/// implementation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collections<T>(&self, f: impl FnOnce(&mut Collections) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        f(&mut guard)
    }
}

impl DocStore for MemoryStore {
    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Doc>> {
        self.with_collections(|collections| {
            let Some(docs) = collections.get(collection) else {
                return Ok(Vec::new());
            };
            Ok(docs
                .iter()
                .filter(|(_, value)| filter.matches(value))
                .map(|(key, value)| Doc {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect())
        })
    }

    fn upsert(&self, collection: &str, key: &str, value: Value) -> StoreResult<()> {
        self.with_collections(|collections| {
            collections
                .entry(collection.to_string())
                .or_default()
                .insert(key.to_string(), value);
            Ok(())
        })
    }

    fn insert(&self, collection: &str, value: Value) -> StoreResult<String> {
        let key = generated_key();
        self.upsert(collection, &key, value)?;
        Ok(key)
    }

    fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<usize> {
        self.with_collections(|collections| {
            let Some(docs) = collections.get_mut(collection) else {
                return Ok(0);
            };
            let before = docs.len();
            docs.retain(|_, value| !filter.matches(value));
            Ok(before - docs.len())
        })
    }

    fn push(&self, collection: &str, key: &str, field: &str, value: Value) -> StoreResult<()> {
        self.with_collections(|collections| {
            let doc = collections
                .entry(collection.to_string())
                .or_default()
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
            apply_push(doc, field, value)
        })
    }

    fn increment(&self, collection: &str, key: &str, field: &str, n: i64) -> StoreResult<()> {
        self.with_collections(|collections| {
            let doc = collections
                .entry(collection.to_string())
                .or_default()
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
            apply_increment(doc, field, n)
        })
    }
}
