//! Table-store boundary.
//!
//! The real store (and its retry policy) lives outside this crate; [`TableStore`] is the seam.
//! [`MemoryTableStore`] evaluates write conditions the way the remote store does and is used for
//! tests and local dry runs.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Record;

use super::request::{BatchWriteRequest, Condition, WriteRequest};

/// Error returned by a [`TableStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write condition was false: an equal or newer item is already stored.
    #[error("conditional check failed for table '{table}' key '{key}'")]
    ConditionalCheckFailed { table: String, key: String },

    /// The item lacks one of the table's key attributes.
    #[error("item for table '{table}' is missing key attribute '{attribute}'")]
    MissingKey { table: String, attribute: String },

    /// Transport or service failure.
    #[error("table store unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    /// Returns `true` for the expected, per-record "newer data already stored" outcome.
    pub fn is_conditional_check_failed(&self) -> bool {
        matches!(self, StoreError::ConditionalCheckFailed { .. })
    }
}

/// Result of one batch write. Rejected puts do not fail the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWriteOutcome {
    /// Number of puts applied.
    pub written: usize,
    /// Keys of puts whose condition was false.
    pub rejected_keys: Vec<String>,
}

/// Target table store.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Apply one conditional put.
    ///
    /// Returns [`StoreError::ConditionalCheckFailed`] if the condition is false.
    async fn put_item(&self, request: &WriteRequest) -> Result<(), StoreError>;

    /// Apply one page of conditional puts.
    async fn batch_write(&self, request: &BatchWriteRequest) -> Result<BatchWriteOutcome, StoreError>;
}

type Tables = BTreeMap<String, BTreeMap<String, Record>>;

/// In-memory [`TableStore`] keyed by a fixed list of key attributes.
#[derive(Debug)]
pub struct MemoryTableStore {
    key_attributes: Vec<String>,
    tables: Mutex<Tables>,
}

impl MemoryTableStore {
    /// Create an empty store whose items are keyed by `key_attributes` (joined with `#`).
    pub fn new<I, S>(key_attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_attributes: key_attributes.into_iter().map(Into::into).collect(),
            tables: Mutex::new(BTreeMap::new()),
        }
    }

    /// Store `item` unconditionally (test setup).
    pub fn seed(&self, table: &str, item: Record) -> Result<(), StoreError> {
        let key = self.key_of(table, &item)?;
        self.lock()?
            .entry(table.to_string())
            .or_default()
            .insert(key, item);
        Ok(())
    }

    /// Fetch an item by its key string.
    pub fn get(&self, table: &str, key: &str) -> Option<Record> {
        self.lock()
            .ok()?
            .get(table)
            .and_then(|items| items.get(key))
            .cloned()
    }

    /// All items of a table, in key order.
    pub fn items(&self, table: &str) -> Vec<Record> {
        self.lock()
            .ok()
            .and_then(|tables| tables.get(table).map(|items| items.values().cloned().collect()))
            .unwrap_or_default()
    }

    /// Key string of `item` for `table`.
    pub fn key_of(&self, table: &str, item: &Record) -> Result<String, StoreError> {
        let parts = self
            .key_attributes
            .iter()
            .map(|attribute| {
                item.get_text(attribute)
                    .ok_or_else(|| StoreError::MissingKey {
                        table: table.to_string(),
                        attribute: attribute.clone(),
                    })
            })
            .collect::<Result<Vec<&str>, StoreError>>()?;
        Ok(parts.join("#"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Unavailable {
            message: "memory store mutex poisoned".to_string(),
        })
    }

    fn apply(
        &self,
        tables: &mut Tables,
        table: &str,
        item: &Record,
        condition: &Condition,
    ) -> Result<(), StoreError> {
        let key = self.key_of(table, item)?;
        let items = tables.entry(table.to_string()).or_default();
        if !condition.is_satisfied_by(items.get(&key)) {
            return Err(StoreError::ConditionalCheckFailed {
                table: table.to_string(),
                key,
            });
        }
        items.insert(key, item.clone());
        Ok(())
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn put_item(&self, request: &WriteRequest) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        self.apply(&mut tables, &request.table, &request.item, &request.condition)
    }

    async fn batch_write(&self, request: &BatchWriteRequest) -> Result<BatchWriteOutcome, StoreError> {
        let mut tables = self.lock()?;
        let mut outcome = BatchWriteOutcome::default();
        for put in &request.puts {
            match self.apply(&mut tables, &request.table, &put.item, &put.condition) {
                Ok(()) => outcome.written += 1,
                Err(StoreError::ConditionalCheckFailed { key, .. }) => outcome.rejected_keys.push(key),
                Err(other) => return Err(other),
            }
        }
        Ok(outcome)
    }
}
