//! Concurrent execution of write requests against a [`TableStore`].

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, warn};

use crate::error::{IngestionError, IngestionResult};

use super::metrics::WriteMetrics;
use super::request::{BatchWriteRequest, WriteRequest};
use super::store::{StoreError, TableStore};

/// Default upper bound on concurrently outstanding store calls.
pub const DEFAULT_WRITE_CONCURRENCY: usize = 16;

/// Outcome of writing one run's requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Items applied by the store.
    pub written: usize,
    /// Keys of items skipped because their condition was false.
    pub rejected_keys: Vec<String>,
    /// Store calls issued (one per put, or one per page in batch mode).
    pub calls: usize,
}

impl WriteSummary {
    pub fn rejected(&self) -> usize {
        self.rejected_keys.len()
    }
}

enum CallOutcome {
    Applied { written: usize, rejected_keys: Vec<String> },
    Failed { items: usize, error: StoreError },
}

/// Issues writes with bounded concurrency and collects their outcomes.
///
/// A conditional-check failure is an expected per-item outcome: it is logged and counted, never
/// returned. Any other store error is logged as it happens and the first one is returned after
/// every outstanding call has settled.
#[derive(Debug)]
pub struct WriteExecutor {
    concurrency: usize,
    metrics: Arc<WriteMetrics>,
}

impl WriteExecutor {
    /// Create an executor allowing up to `concurrency` outstanding store calls.
    ///
    /// # Panics
    ///
    /// Panics if `concurrency == 0`.
    pub fn new(concurrency: usize) -> Self {
        assert!(concurrency > 0, "concurrency must be > 0");
        Self {
            concurrency,
            metrics: Arc::new(WriteMetrics::new()),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Get a handle to real-time write metrics.
    pub fn metrics(&self) -> Arc<WriteMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Issue one conditional put per request.
    pub async fn put_all(
        &self,
        store: &dyn TableStore,
        requests: Vec<WriteRequest>,
    ) -> IngestionResult<WriteSummary> {
        let metrics = self.metrics.as_ref();
        let calls = requests.into_iter().map(move |request| async move {
            metrics.on_write_start(1);
            let outcome = match store.put_item(&request).await {
                Ok(()) => CallOutcome::Applied {
                    written: 1,
                    rejected_keys: Vec::new(),
                },
                Err(StoreError::ConditionalCheckFailed { table, key }) => {
                    warn!(table = %table, key = %key, "skipped write: newer data already stored");
                    CallOutcome::Applied {
                        written: 0,
                        rejected_keys: vec![key],
                    }
                }
                Err(error) => {
                    error!(table = %request.table, error = %error, "write failed");
                    CallOutcome::Failed { items: 1, error }
                }
            };
            metrics.on_write_end();
            outcome
        });
        self.run(calls).await
    }

    /// Issue one batch call per page.
    pub async fn batch_write_all(
        &self,
        store: &dyn TableStore,
        batches: Vec<BatchWriteRequest>,
    ) -> IngestionResult<WriteSummary> {
        let metrics = self.metrics.as_ref();
        let calls = batches.into_iter().map(move |batch| async move {
            metrics.on_write_start(batch.len());
            let outcome = match store.batch_write(&batch).await {
                Ok(outcome) => {
                    for key in &outcome.rejected_keys {
                        warn!(table = %batch.table, key = %key, "skipped batch put: item missing or not older");
                    }
                    CallOutcome::Applied {
                        written: outcome.written,
                        rejected_keys: outcome.rejected_keys,
                    }
                }
                Err(error) => {
                    error!(table = %batch.table, puts = batch.len(), error = %error, "batch write failed");
                    CallOutcome::Failed {
                        items: batch.len(),
                        error,
                    }
                }
            };
            metrics.on_write_end();
            outcome
        });
        self.run(calls).await
    }

    async fn run<I, F>(&self, calls: I) -> IngestionResult<WriteSummary>
    where
        I: Iterator<Item = F>,
        F: Future<Output = CallOutcome>,
    {
        let start = Instant::now();
        self.metrics.begin_run();

        let outcomes: Vec<CallOutcome> = stream::iter(calls)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = WriteSummary::default();
        let mut first_failure = None;
        for outcome in outcomes {
            summary.calls += 1;
            match outcome {
                CallOutcome::Applied {
                    written,
                    rejected_keys,
                } => {
                    self.metrics.on_written(written);
                    self.metrics.on_rejected(rejected_keys.len());
                    summary.written += written;
                    summary.rejected_keys.extend(rejected_keys);
                }
                CallOutcome::Failed { items, error } => {
                    self.metrics.on_failed(items);
                    first_failure.get_or_insert(error);
                }
            }
        }

        self.metrics.end_run(start.elapsed());
        debug!(metrics = %self.metrics.snapshot(), "write run finished");

        match first_failure {
            Some(error) => Err(IngestionError::Store(error)),
            None => Ok(summary),
        }
    }
}

impl Default for WriteExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::types::Record;
    use crate::write::request::{DEFAULT_TIMESTAMP_FIELD, WriteRequestBuilder};
    use crate::write::store::{BatchWriteOutcome, MemoryTableStore};

    fn records(ids: &[&str], ts: &str) -> Vec<Record> {
        ids.iter()
            .map(|id| Record::from_iter([("AnimalId", *id), (DEFAULT_TIMESTAMP_FIELD, ts)]))
            .collect()
    }

    fn puts(ids: &[&str], ts: &str) -> Vec<WriteRequest> {
        WriteRequestBuilder::new("Animals")
            .build_put_requests(records(ids, ts))
            .unwrap()
    }

    /// Yields before answering so concurrent calls overlap; fails for one key.
    struct SlowStore {
        fail_key: Option<&'static str>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowStore {
        fn new(fail_key: Option<&'static str>) -> Self {
            Self {
                fail_key,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TableStore for SlowStore {
        async fn put_item(&self, request: &WriteRequest) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            match (self.fail_key, request.item.get_text("AnimalId")) {
                (Some(fail), Some(id)) if fail == id => Err(StoreError::Unavailable {
                    message: "throttled".to_string(),
                }),
                _ => Ok(()),
            }
        }

        async fn batch_write(&self, request: &BatchWriteRequest) -> Result<BatchWriteOutcome, StoreError> {
            Ok(BatchWriteOutcome {
                written: request.len(),
                rejected_keys: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn rejected_puts_do_not_fail_the_run() {
        let store = MemoryTableStore::new(["AnimalId"]);
        let executor = WriteExecutor::new(4);
        executor
            .put_all(&store, puts(&["A1", "A2"], "2017-02-01T00:00:00Z"))
            .await
            .unwrap();

        let summary = executor
            .put_all(&store, puts(&["A1", "A2", "A3"], "2017-01-01T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(summary.written, 1);
        assert_eq!(summary.rejected(), 2);
        assert_eq!(summary.calls, 3);
        let snap = executor.metrics().snapshot();
        assert_eq!((snap.attempted, snap.written, snap.rejected), (3, 1, 2));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let store = SlowStore::new(None);
        let ids: Vec<String> = (0..20).map(|i| format!("A{i}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        let executor = WriteExecutor::new(4);
        let summary = executor
            .put_all(&store, puts(&id_refs, "2017-01-01T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(summary.written, 20);
        let max = store.max_active.load(Ordering::SeqCst);
        assert!(max > 1, "expected overlapping writes, saw {max}");
        assert!(max <= 4, "expected at most 4 in flight, saw {max}");
        assert!(executor.metrics().snapshot().max_in_flight <= 4);
    }

    #[tokio::test]
    async fn other_errors_surface_after_all_writes_settle() {
        let store = SlowStore::new(Some("A1"));
        let executor = WriteExecutor::new(2);
        let err = executor
            .put_all(&store, puts(&["A0", "A1", "A2", "A3"], "2017-01-01T00:00:00Z"))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestionError::Store(StoreError::Unavailable { .. })));
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
        let snap = executor.metrics().snapshot();
        assert_eq!((snap.written, snap.failed), (3, 1));
    }

    #[tokio::test]
    async fn batch_pages_report_rejected_keys() {
        let store = MemoryTableStore::new(["AnimalId"]);
        store
            .seed("Animals", records(&["A1"], "2017-01-01T00:00:00Z").remove(0))
            .unwrap();
        let batches = WriteRequestBuilder::new("Animals")
            .build_batch_requests(records(&["A1", "A2", "A3"], "2017-02-01T00:00:00Z"), 2)
            .unwrap();

        let summary = WriteExecutor::default()
            .batch_write_all(&store, batches)
            .await
            .unwrap();

        assert_eq!(summary.calls, 2);
        assert_eq!(summary.written, 1);
        let mut rejected = summary.rejected_keys.clone();
        rejected.sort();
        assert_eq!(rejected, vec!["A2".to_string(), "A3".to_string()]);
    }

    #[tokio::test]
    async fn empty_input_issues_no_calls() {
        let store = SlowStore::new(None);
        let summary = WriteExecutor::default().put_all(&store, Vec::new()).await.unwrap();
        assert_eq!(summary, WriteSummary::default());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }
}
