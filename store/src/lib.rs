//! Document-collection persistence.
//!
//! Provides a trait-based document store interface with an in-memory
//! implementation for testing and a redb-based implementation for
//! persistence. Documents are JSON objects grouped into named
//! collections; each document lives under a string key unique within its
//! collection.

pub mod memory;
pub mod redb;

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur in document store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store: storage error: {0}")]
    Storage(String),

    #[error("store: serialization error: {0}")]
    Serialization(String),

    #[error("store: invalid field access: {0}")]
    InvalidField(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Equality filter over top-level document fields.
///
/// An empty filter matches every document. Fields are kept in a BTreeMap
/// so filter iteration is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    fields: BTreeMap<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field == value`. Chainable.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True iff every filter field equals the corresponding document
    /// field. Non-object documents match only the empty filter.
    pub fn matches(&self, doc: &Value) -> bool {
        if self.fields.is_empty() {
            return true;
        }
        let Some(obj) = doc.as_object() else {
            return false;
        };
        self.fields
            .iter()
            .all(|(field, expect)| obj.get(field) == Some(expect))
    }
}

/// A stored document together with its collection-scoped key.
///
/// Carrying the key lets callers re-address a found document later, e.g.
/// to replace a recent attendance record instead of duplicating it.
#[derive(Debug, Clone, PartialEq)]
pub struct Doc {
    pub key: String,
    pub value: Value,
}

/// Document store over named collections.
///
/// `find` returns documents in key order; keys generated by [`DocStore::insert`]
/// sort in insertion order, so a collection populated purely via `insert`
/// reads back in the order it was written.
pub trait DocStore: Send + Sync {
    /// Return every document in the collection matching the filter.
    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Doc>>;

    /// Insert or replace the document at the given key. Idempotent: the
    /// last write for a key wins and exactly one document remains.
    fn upsert(&self, collection: &str, key: &str, value: Value) -> StoreResult<()>;

    /// Insert a document under a freshly generated key; returns the key.
    fn insert(&self, collection: &str, value: Value) -> StoreResult<String>;

    /// Delete every document matching the filter; returns how many were
    /// removed.
    fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<usize>;

    /// Append a value to an array field of the document at `key`,
    /// creating the document or the field as needed. Errors if the field
    /// exists but is not an array.
    fn push(&self, collection: &str, key: &str, field: &str, value: Value) -> StoreResult<()>;

    /// Add `n` to a numeric field of the document at `key`, creating the
    /// document or the field (starting from zero) as needed. Errors if
    /// the field exists but is not a number.
    fn increment(&self, collection: &str, key: &str, field: &str, n: i64) -> StoreResult<()>;
}

impl fmt::Debug for dyn DocStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocStore {{ ... }}")
    }
}

/// Generate a collection-scoped key that sorts in insertion order:
/// zero-padded nanosecond timestamp plus a random suffix for same-instant
/// inserts.
pub(crate) fn generated_key() -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{ts:020}-{}", &suffix[..8])
}

/// Append to an array field of a document, shared by both store
/// implementations.
pub(crate) fn apply_push(doc: &mut Value, field: &str, value: Value) -> StoreResult<()> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidField(format!("{field}: document is not an object")))?;
    let slot = obj
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => {
            items.push(value);
            Ok(())
        }
        _ => Err(StoreError::InvalidField(format!("{field}: not an array"))),
    }
}

/// Add to a numeric field of a document, shared by both store
/// implementations.
pub(crate) fn apply_increment(doc: &mut Value, field: &str, n: i64) -> StoreResult<()> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidField(format!("{field}: document is not an object")))?;
    let next = match obj.get(field) {
        None | Some(Value::Null) => Value::from(n),
        Some(v) if v.is_i64() => Value::from(v.as_i64().unwrap_or(0) + n),
        Some(v) if v.is_f64() => Value::from(v.as_f64().unwrap_or(0.0) + n as f64),
        Some(_) => {
            return Err(StoreError::InvalidField(format!("{field}: not a number")));
        }
    };
    obj.insert(field.to_string(), next);
    Ok(())
}

pub use self::memory::MemoryStore;
pub use self::redb::RedbStore;
