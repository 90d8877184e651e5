//! Derived composite properties.
//!
//! Some tables index on a combination of properties. A [`DerivedProperty`] joins the values of
//! its base properties with `-` into a new property named by joining the base names the same way.

use crate::types::Record;

const JOINER: &str = "-";

/// A composite property built from several base properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedProperty {
    /// Base property names, in join order.
    pub base_property_names: Vec<String>,
}

impl DerivedProperty {
    /// Create a derived property from its base property names.
    pub fn new<I, S>(base_property_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base_property_names: base_property_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Name of the derived property (`A-B`).
    pub fn name(&self) -> String {
        self.base_property_names.join(JOINER)
    }

    /// Derived value for `record`, or `None` if any base property is missing or not a scalar.
    pub fn value_for(&self, record: &Record) -> Option<String> {
        let values = self
            .base_property_names
            .iter()
            .map(|name| record.get_text(name))
            .collect::<Option<Vec<&str>>>()?;
        Some(values.join(JOINER))
    }
}

/// Derived properties injected by default: `BehaviorCategory-BehaviorTest`.
pub fn default_derived_properties() -> Vec<DerivedProperty> {
    vec![DerivedProperty::new(["BehaviorCategory", "BehaviorTest"])]
}

/// Returns `records` with every applicable derived property injected.
///
/// Records that lack any base property of a definition are left unchanged for that definition.
pub fn inject_derived_properties(definitions: &[DerivedProperty], records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .map(|mut record| {
            for definition in definitions {
                if let Some(value) = definition.value_for(&record) {
                    record.insert(definition.name(), value);
                }
            }
            record
        })
        .collect()
}
