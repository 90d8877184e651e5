//! Write-request building and execution.
//!
//! - [`request`]: conditional puts and paged batch writes built from records
//! - [`store`]: the [`TableStore`] seam plus an in-memory implementation
//! - [`executor`]: bounded-concurrency execution with per-item rejection tolerance

pub mod executor;
mod metrics;
pub mod request;
pub mod store;

pub use executor::{DEFAULT_WRITE_CONCURRENCY, WriteExecutor, WriteSummary};
pub use metrics::{WriteMetrics, WriteMetricsSnapshot};
pub use request::{
    BatchWriteRequest, Condition, ConditionKind, ConditionalPut, DEFAULT_TIMESTAMP_FIELD,
    MAX_BATCH_PAGE_SIZE, WriteRequest, WriteRequestBuilder, paginate,
};
pub use store::{BatchWriteOutcome, MemoryTableStore, StoreError, TableStore};
