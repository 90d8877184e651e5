//! `export-ingest` turns periodic CSV data-export attachments into nested records and writes them
//! to a table store with conditions that never replace newer data with older data.
//!
//! The primary entrypoint is [`ingestion::IngestionPipeline`], which fetches an attachment for an
//! [`ingestion::IngestionNotification`], parses and sanitizes it, and fans out conditional writes
//! to a [`write::TableStore`].
//!
//! ## Nested CSV
//!
//! A flat export encodes one-to-many relationships with a sentinel column, `__RowSubType`:
//!
//! - an empty sentinel starts a new base record
//! - a non-empty sentinel names a sub-group, and the row's `Group:Field` columns are appended as
//!   one entry of that group on the most recent base record
//!
//! ```rust
//! use export_ingest::ingestion::{NestedCsvOptions, parse_nested_csv};
//!
//! # fn main() -> Result<(), export_ingest::IngestionError> {
//! let csv = "Id,__RowSubType,Memos:Text\n1,,\n,Memos,hello\n,Memos,world\n";
//! let records = parse_nested_csv(csv.as_bytes(), &NestedCsvOptions::default())?;
//!
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].get_text("Id"), Some("1"));
//! assert_eq!(records[0].get_group("Memos").map(|m| m.len()), Some(2));
//! # Ok(())
//! # }
//! ```
//!
//! ## Running the pipeline
//!
//! ```rust
//! use export_ingest::config::IngestConfig;
//! use export_ingest::ingestion::{IngestionNotification, IngestionPipeline};
//! use export_ingest::source::InMemoryAttachmentSource;
//! use export_ingest::write::MemoryTableStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), export_ingest::IngestionError> {
//! let source = InMemoryAttachmentSource::new()
//!     .with_attachment("msg-1", "Animal ID,Name,__RowSubType\nA1,Rex,\n");
//! let store = MemoryTableStore::new(["AnimalId"]);
//! let pipeline = IngestionPipeline::new(IngestConfig::default())?;
//!
//! let notification = IngestionNotification {
//!     message_id: "msg-1".to_string(),
//!     subject: "Data export - Animals has been completed.".to_string(),
//!     timestamp: "2017-08-13T01:58:56.622Z".to_string(),
//! };
//! let report = pipeline.run(&notification, &source, &store).await?;
//!
//! assert_eq!(report.table, "Animals");
//! assert_eq!(report.written, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: the pipeline plus its parse, sanitize and classify stages
//! - [`processing`]: in-memory record enrichment (derived and constant properties)
//! - [`write`]: conditional write requests, the table-store seam, concurrent execution
//! - [`source`]: the attachment-retrieval seam
//! - [`types`]: records, field values and the header group map
//! - [`config`] and [`logging`]: environment-driven configuration
//! - [`error`]: error types used across the crate

pub mod config;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod processing;
pub mod source;
pub mod types;
pub mod write;

pub use error::{IngestionError, IngestionResult};
