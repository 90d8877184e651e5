//! Run-scoped constant properties for [`crate::types::Record`]s.

use std::collections::BTreeMap;

use crate::types::Record;

/// Constant properties set on every record of a run (e.g. the ingestion timestamp).
pub type ConstantProperties = BTreeMap<String, String>;

/// Returns `records` with every key of `constants` set on each record.
///
/// Existing properties with the same name are overwritten. Order is preserved.
pub fn augment(constants: &ConstantProperties, records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .map(|mut record| {
            for (name, value) in constants {
                record.insert(name.clone(), value.clone());
            }
            record
        })
        .collect()
}
