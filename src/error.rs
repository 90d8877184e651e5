use thiserror::Error;

use crate::source::SourceError;
use crate::write::StoreError;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned by the ingestion pipeline and its stages.
///
/// Everything except [`IngestionError::Store`] is raised before the first write is issued, so a
/// run that fails with one of those variants has not touched the table store.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying I/O error (e.g. log file or attachment directory not readable).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV tokenization error (unbalanced quotes, rows with the wrong field count, ...).
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Missing sentinel column, ambiguous sub-group header, or a row naming an unknown group.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// A sub-group row appeared before any base row.
    #[error("sequencing error at row {row}: sub-group row has no preceding base row")]
    Sequencing { row: usize },

    /// A date-like value did not match the expected export pattern.
    #[error("failed to format value at row {row} column '{column}': {message} (raw='{raw}')")]
    Format {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// A record reached write-building without a required field.
    #[error("record is missing required field '{field}': {record}")]
    Validation { field: String, record: String },

    /// No table could be inferred from the notification subject.
    #[error("could not infer table name from subject '{subject}'")]
    Classification { subject: String },

    /// Invalid configuration value.
    #[error("config error: {message}")]
    Config { message: String },

    /// The attachment could not be retrieved.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// A write failed for a reason other than its condition.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
