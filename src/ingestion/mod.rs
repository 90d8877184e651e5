//! Ingestion entrypoints and stages.
//!
//! Most callers should use [`IngestionPipeline`] (from [`pipeline`]) which:
//!
//! - resolves the target table and fetches the attachment
//! - parses, sanitizes and enriches records
//! - issues conditional writes and reports the outcome to an optional [`IngestionObserver`]
//!
//! The stages are also available on their own:
//! - [`nested_csv`]: sentinel-driven nested CSV parsing
//! - [`sanitize`]: header and value normalization
//! - [`classify`]: table inference from the notification subject

pub mod classify;
pub mod nested_csv;
pub mod observability;
pub mod pipeline;
pub mod sanitize;

pub use classify::infer_table_name;
pub use nested_csv::{NestedCsvOptions, parse_nested_csv, parse_nested_csv_from_reader};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    TracingObserver, severity_for_error,
};
pub use pipeline::{IngestionNotification, IngestionOptions, IngestionPipeline, IngestionReport};
pub use sanitize::{FieldSanitizer, sanitize_column_name};
