//! Conditional write requests.
//!
//! Every item carries the run's ingestion timestamp, and every write is conditioned on the stored
//! item being older, so an out-of-order or repeated run can never replace newer data.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{IngestionError, IngestionResult};
use crate::types::Record;

/// Default name of the ingestion timestamp property.
pub const DEFAULT_TIMESTAMP_FIELD: &str = "LastIngestedDateTime";

/// Maximum number of puts in one batch write of the target store.
pub const MAX_BATCH_PAGE_SIZE: usize = 25;

const OLD_TIMESTAMP_NAME: &str = "#OldIngestedDateTime";
const NEW_TIMESTAMP_VALUE: &str = ":NewIngestedDateTime";

/// Which predicate a [`Condition`] expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    /// No stored timestamp, or the stored timestamp is strictly older.
    NotExistsOrOlder,
    /// The stored timestamp exists and is strictly older.
    Older,
}

/// Write condition over the stored item's timestamp attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    kind: ConditionKind,
    attribute: String,
    value: String,
}

impl Condition {
    /// "attribute absent OR stored < value".
    pub fn not_exists_or_older(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::NotExistsOrOlder,
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// "stored < value".
    pub fn older(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Older,
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    /// Name of the timestamp attribute the condition reads.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// The new item's timestamp, compared against the stored one.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Condition expression in the target store's syntax.
    pub fn expression(&self) -> String {
        let older = format!("{OLD_TIMESTAMP_NAME} < {NEW_TIMESTAMP_VALUE}");
        match self.kind {
            ConditionKind::NotExistsOrOlder => {
                format!("attribute_not_exists({OLD_TIMESTAMP_NAME}) OR {older}")
            }
            ConditionKind::Older => older,
        }
    }

    /// Placeholder -> attribute name substitutions for [`Self::expression`].
    pub fn attribute_names(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(OLD_TIMESTAMP_NAME.to_string(), self.attribute.clone())])
    }

    /// Placeholder -> value substitutions for [`Self::expression`].
    pub fn attribute_values(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(NEW_TIMESTAMP_VALUE.to_string(), self.value.clone())])
    }

    /// Evaluate the condition against the currently stored item, as the store would.
    ///
    /// Timestamps are ISO-8601 strings, so ordering is lexicographic.
    pub fn is_satisfied_by(&self, existing: Option<&Record>) -> bool {
        let stored = existing.and_then(|item| item.get_text(&self.attribute));
        match (self.kind, stored) {
            (ConditionKind::NotExistsOrOlder, None) => true,
            (ConditionKind::Older, None) => false,
            (_, Some(old)) => old < self.value.as_str(),
        }
    }
}

/// A single conditional put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub table: String,
    pub item: Record,
    pub condition: Condition,
}

/// One put inside a [`BatchWriteRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalPut {
    pub item: Record,
    pub condition: Condition,
}

/// One page of conditional puts against a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriteRequest {
    pub table: String,
    pub puts: Vec<ConditionalPut>,
}

impl BatchWriteRequest {
    pub fn len(&self) -> usize {
        self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }
}

fn serialize_put<M: SerializeMap>(
    map: &mut M,
    table: Option<&str>,
    item: &Record,
    condition: &Condition,
) -> Result<(), M::Error> {
    if let Some(table) = table {
        map.serialize_entry("TableName", table)?;
    }
    map.serialize_entry("Item", item)?;
    map.serialize_entry("ConditionExpression", &condition.expression())?;
    map.serialize_entry("ExpressionAttributeNames", &condition.attribute_names())?;
    map.serialize_entry("ExpressionAttributeValues", &condition.attribute_values())
}

impl Serialize for WriteRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        serialize_put(&mut map, Some(self.table.as_str()), &self.item, &self.condition)?;
        map.end()
    }
}

impl Serialize for ConditionalPut {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Inner<'a>(&'a ConditionalPut);

        impl Serialize for Inner<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(4))?;
                serialize_put(&mut map, None, &self.0.item, &self.0.condition)?;
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("PutRequest", &Inner(self))?;
        map.end()
    }
}

impl Serialize for BatchWriteRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let items = BTreeMap::from([(self.table.as_str(), &self.puts)]);
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("RequestItems", &items)?;
        map.end()
    }
}

/// Builds conditional write requests for one target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequestBuilder {
    table: String,
    timestamp_field: String,
}

impl WriteRequestBuilder {
    /// Builder for `table`, reading the timestamp from [`DEFAULT_TIMESTAMP_FIELD`].
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
        }
    }

    /// Use a different timestamp property.
    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn timestamp_field(&self) -> &str {
        &self.timestamp_field
    }

    /// One put per record, conditioned on "no stored timestamp, or stored timestamp older".
    pub fn build_put_requests(&self, records: Vec<Record>) -> IngestionResult<Vec<WriteRequest>> {
        records
            .into_iter()
            .map(|item| -> IngestionResult<WriteRequest> {
                let ingested_at = self.ingested_at(&item)?.to_string();
                Ok(WriteRequest {
                    table: self.table.clone(),
                    condition: Condition::not_exists_or_older(&self.timestamp_field, ingested_at),
                    item,
                })
            })
            .collect()
    }

    /// Pages of at most `page_size` puts, each conditioned on "stored timestamp older".
    ///
    /// Batch mode has no not-exists branch: it is meant for refreshing items that already exist.
    pub fn build_batch_requests(
        &self,
        records: Vec<Record>,
        page_size: usize,
    ) -> IngestionResult<Vec<BatchWriteRequest>> {
        if page_size == 0 {
            return Err(IngestionError::Config {
                message: "batch page size must be > 0".to_string(),
            });
        }

        let puts = records
            .into_iter()
            .map(|item| -> IngestionResult<ConditionalPut> {
                let ingested_at = self.ingested_at(&item)?.to_string();
                Ok(ConditionalPut {
                    condition: Condition::older(&self.timestamp_field, ingested_at),
                    item,
                })
            })
            .collect::<IngestionResult<Vec<_>>>()?;

        Ok(paginate(puts, page_size)
            .into_iter()
            .map(|puts| BatchWriteRequest {
                table: self.table.clone(),
                puts,
            })
            .collect())
    }

    fn ingested_at<'r>(&self, record: &'r Record) -> IngestionResult<&'r str> {
        record
            .get_text(&self.timestamp_field)
            .filter(|ts| !ts.is_empty())
            .ok_or_else(|| IngestionError::Validation {
                field: self.timestamp_field.clone(),
                record: record.to_json_string(),
            })
    }
}

/// Split `items` into contiguous pages of `page_size`; the last page may be shorter.
///
/// # Panics
///
/// Panics if `page_size == 0`.
pub fn paginate<T>(items: Vec<T>, page_size: usize) -> Vec<Vec<T>> {
    assert!(page_size > 0, "page_size must be > 0");
    let mut pages = Vec::with_capacity(items.len().div_ceil(page_size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        pages.push(iter.by_ref().take(page_size).collect());
    }
    pages
}
