//! Target-table inference from the export notification subject.

use crate::error::{IngestionError, IngestionResult};

/// Subject markers and their tables, most specific first. The general `Animals` entry stays last.
const SUBJECT_TABLES: &[(&str, &str)] = &[
    ("AnimalMemos", "AnimalMemos"),
    ("AnimalHolds", "AnimalHolds"),
    ("AnimalBehaviorTests", "AnimalBehaviorTests"),
    ("AnimalPetIds", "AnimalPetIds"),
    ("Animals", "Animals"),
];

/// Infer the target table from an export email subject.
///
/// ```rust
/// use export_ingest::ingestion::classify::infer_table_name;
///
/// let table = infer_table_name("Report animal-status data export - AnimalHolds has been completed.")
///     .unwrap();
/// assert_eq!(table, "AnimalHolds");
/// ```
pub fn infer_table_name(subject: &str) -> IngestionResult<&'static str> {
    SUBJECT_TABLES
        .iter()
        .find(|(marker, _)| subject.contains(marker))
        .map(|(_, table)| *table)
        .ok_or_else(|| IngestionError::Classification {
            subject: subject.to_string(),
        })
}
