//! Core data model types for nested export ingestion.
//!
//! A flat export is parsed into [`Record`]s: base fields become [`FieldValue::Text`] properties,
//! and every sub-group named by a `Group:Field` header becomes a [`FieldValue::Group`] holding an
//! ordered list of [`SubRecord`]s. The grouping of a header set is described by a [`GroupMap`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};

/// Header whose per-row value selects the sub-group a row populates (empty = base row).
pub const SENTINEL_HEADER: &str = "__RowSubType";

/// Separator between sub-group name and sub-group field name in a header.
pub const GROUP_SEPARATOR: char = ':';

/// Group name used for base-record fields in a [`GroupMap`].
pub const BASE_GROUP: &str = "";

/// One entry of a sub-group: sub-group field name -> value.
pub type SubRecord = BTreeMap<String, String>;

/// A single property value of a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Scalar base-record value.
    Text(String),
    /// Ordered list of sub-group entries.
    Group(Vec<SubRecord>),
}

impl FieldValue {
    /// Returns the text value, if this is a scalar.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            FieldValue::Group(_) => None,
        }
    }

    /// Returns the sub-group entries, if this is a group.
    pub fn as_group(&self) -> Option<&[SubRecord]> {
        match self {
            FieldValue::Text(_) => None,
            FieldValue::Group(entries) => Some(entries.as_slice()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// A nested record produced from one base row and its following sub-group rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of properties (scalars and groups).
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no properties.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a property.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Look up a scalar property.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_text)
    }

    /// Look up a sub-group property.
    pub fn get_group(&self, name: &str) -> Option<&[SubRecord]> {
        self.fields.get(name).and_then(FieldValue::as_group)
    }

    /// Set a property, replacing any existing value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Append an entry to the named sub-group, creating the group on first use.
    ///
    /// A scalar already stored under `group` is replaced by the new group.
    pub fn push_group_entry(&mut self, group: &str, entry: SubRecord) {
        match self.fields.get_mut(group) {
            Some(FieldValue::Group(entries)) => entries.push(entry),
            _ => {
                self.fields
                    .insert(group.to_string(), FieldValue::Group(vec![entry]));
            }
        }
    }

    /// Returns `true` if the property is present.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate property names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterate properties in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render the record as compact JSON (used for diagnostics).
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self.fields))
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// A field that belongs to a group, together with its CSV column index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupField {
    /// Field name within the group (the part after `:` for sub-groups).
    pub name: String,
    /// Column index in the CSV record.
    pub column: usize,
}

/// Mapping from group name ([`BASE_GROUP`] for base fields) to its ordered fields.
///
/// Derived once per parse from the (already mapped) header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupMap {
    groups: BTreeMap<String, Vec<GroupField>>,
    sentinel_column: usize,
}

impl GroupMap {
    /// Build a group map from a mapped header row.
    ///
    /// Fails with [`IngestionError::Schema`] if the sentinel header is absent, or if a header has
    /// more than one separator or an empty group/field name around its separator.
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> IngestionResult<Self> {
        let sentinel_column = headers
            .iter()
            .position(|h| h.as_ref() == SENTINEL_HEADER)
            .ok_or_else(|| IngestionError::Schema {
                message: format!(
                    "missing sentinel column '{SENTINEL_HEADER}'. headers={:?}",
                    headers.iter().map(|h| h.as_ref()).collect::<Vec<&str>>()
                ),
            })?;

        let mut groups: BTreeMap<String, Vec<GroupField>> = BTreeMap::new();
        groups.insert(BASE_GROUP.to_string(), Vec::new());

        for (column, header) in headers.iter().enumerate() {
            if column == sentinel_column {
                continue;
            }
            let header = header.as_ref();
            let (group, name) = split_header(header)?;
            groups.entry(group.to_string()).or_default().push(GroupField {
                name: name.to_string(),
                column,
            });
        }

        Ok(Self {
            groups,
            sentinel_column,
        })
    }

    /// Column index of the sentinel header.
    pub fn sentinel_column(&self) -> usize {
        self.sentinel_column
    }

    /// Fields of a group, in header order.
    pub fn fields(&self, group: &str) -> Option<&[GroupField]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// Field names of a group, in header order.
    pub fn field_names(&self, group: &str) -> Option<Vec<&str>> {
        self.fields(group)
            .map(|fields| fields.iter().map(|f| f.name.as_str()).collect())
    }

    /// Iterate sub-group names (the base group is excluded).
    pub fn sub_groups(&self) -> impl Iterator<Item = &str> {
        self.groups
            .keys()
            .map(String::as_str)
            .filter(|g| !g.is_empty())
    }
}

fn split_header(header: &str) -> IngestionResult<(&str, &str)> {
    let mut parts = header.split(GROUP_SEPARATOR);
    let first = parts.next().unwrap_or_default();
    match (parts.next(), parts.next()) {
        (None, _) => Ok((BASE_GROUP, header)),
        (Some(field), None) => {
            if first.is_empty() || field.is_empty() {
                return Err(IngestionError::Schema {
                    message: format!("sub-group header '{header}' has an empty group or field name"),
                });
            }
            Ok((first, field))
        }
        (Some(_), Some(_)) => Err(IngestionError::Schema {
            message: format!(
                "header '{header}' contains more than one '{GROUP_SEPARATOR}' separator"
            ),
        }),
    }
}
