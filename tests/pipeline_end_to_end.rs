use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use export_ingest::IngestionError;
use export_ingest::config::{IngestConfig, WriteMode};
use export_ingest::ingestion::{IngestionNotification, IngestionPipeline};
use export_ingest::source::{DirectoryAttachmentSource, InMemoryAttachmentSource, SourceError};
use export_ingest::types::Record;
use export_ingest::write::{
    BatchWriteOutcome, BatchWriteRequest, MemoryTableStore, StoreError, TableStore, WriteRequest,
    WriteRequestBuilder,
};

const TWO_ANIMALS: &str = "\
Animal ID,Animal Name,Intake Date,__RowSubType
A1,Rex,8/12/2017 11:56 AM,
A2,Mittens,2/4/2010 12:00 AM,
";

fn notification(timestamp: &str) -> IngestionNotification {
    IngestionNotification {
        message_id: "msg-1".to_string(),
        subject: "Report animal-status data export - Animals has been completed.".to_string(),
        timestamp: timestamp.to_string(),
    }
}

fn source(csv: &str) -> InMemoryAttachmentSource {
    InMemoryAttachmentSource::new().with_attachment("msg-1", csv)
}

/// Counts calls so tests can assert nothing was written.
#[derive(Default)]
struct CountingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl TableStore for CountingStore {
    async fn put_item(&self, _request: &WriteRequest) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn batch_write(&self, request: &BatchWriteRequest) -> Result<BatchWriteOutcome, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(BatchWriteOutcome {
            written: request.len(),
            rejected_keys: Vec::new(),
        })
    }
}

#[tokio::test]
async fn two_records_are_written_with_the_run_timestamp() {
    let store = MemoryTableStore::new(["AnimalId"]);
    let pipeline = IngestionPipeline::new(IngestConfig::default()).unwrap();

    let report = pipeline
        .run(&notification("2017-08-13T01:58:56.622Z"), &source(TWO_ANIMALS), &store)
        .await
        .unwrap();

    assert_eq!(report.table, "Animals");
    assert_eq!(report.records, 2);
    assert_eq!(report.written, 2);
    assert!(report.rejected_keys.is_empty());

    let rex = store.get("Animals", "A1").unwrap();
    assert_eq!(rex.get_text("AnimalName"), Some("Rex"));
    assert_eq!(rex.get_text("IntakeDateTime"), Some("2017-08-12T18:56:00Z"));
    assert_eq!(rex.get_text("LastIngestedDateTime"), Some("2017-08-13T01:58:56.622Z"));
}

#[tokio::test]
async fn older_run_is_rejected_per_item_without_failing() {
    let store = MemoryTableStore::new(["AnimalId"]);
    let pipeline = IngestionPipeline::new(IngestConfig::default()).unwrap();

    pipeline
        .run(&notification("2017-08-14T00:00:00.000Z"), &source(TWO_ANIMALS), &store)
        .await
        .unwrap();

    let with_new_animal = format!("{TWO_ANIMALS}A3,Bella,8/12/2017 11:56 AM,\n");
    let report = pipeline
        .run(&notification("2017-08-13T00:00:00.000Z"), &source(&with_new_animal), &store)
        .await
        .unwrap();

    assert_eq!(report.written, 1);
    let mut rejected = report.rejected_keys.clone();
    rejected.sort();
    assert_eq!(rejected, vec!["A1".to_string(), "A2".to_string()]);

    let rex = store.get("Animals", "A1").unwrap();
    assert_eq!(rex.get_text("LastIngestedDateTime"), Some("2017-08-14T00:00:00.000Z"));
    assert_eq!(store.items("Animals").len(), 3);
}

#[tokio::test]
async fn malformed_input_aborts_before_any_write() {
    let pipeline = IngestionPipeline::new(IngestConfig::default()).unwrap();
    let inputs = [
        // bad date on the second record
        "Animal ID,Intake Date,__RowSubType\nA1,8/12/2017 11:56 AM,\nA2,someday,\n",
        // ragged row
        "Animal ID,Intake Date,__RowSubType\nA1,8/12/2017 11:56 AM,\nA2\n",
        // no sentinel column
        "Animal ID,Intake Date\nA1,8/12/2017 11:56 AM\n",
    ];

    for csv in inputs {
        let store = CountingStore::default();
        let err = pipeline
            .run(&notification("2017-08-13T01:58:56.622Z"), &source(csv), &store)
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                IngestionError::Format { .. } | IngestionError::Csv(_) | IngestionError::Schema { .. }
            ),
            "unexpected error {err:?}"
        );
        assert_eq!(store.calls.load(Ordering::SeqCst), 0, "input {csv:?} reached the store");
    }
}

#[tokio::test]
async fn empty_timestamp_is_a_validation_error() {
    let store = CountingStore::default();
    let pipeline = IngestionPipeline::new(IngestConfig::default()).unwrap();
    let err = pipeline
        .run(&notification(""), &source(TWO_ANIMALS), &store)
        .await
        .unwrap_err();

    match err {
        IngestionError::Validation { field, .. } => assert_eq!(field, "LastIngestedDateTime"),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_subject_fails_classification() {
    let store = CountingStore::default();
    let pipeline = IngestionPipeline::new(IngestConfig::default()).unwrap();
    let mut n = notification("2017-08-13T01:58:56.622Z");
    n.subject = "Weekly newsletter".to_string();

    let err = pipeline.run(&n, &source(TWO_ANIMALS), &store).await.unwrap_err();
    assert!(matches!(err, IngestionError::Classification { .. }));
}

#[tokio::test]
async fn missing_attachment_is_a_source_error() {
    let store = CountingStore::default();
    let pipeline = IngestionPipeline::new(IngestConfig::default()).unwrap();
    let err = pipeline
        .run(
            &notification("2017-08-13T01:58:56.622Z"),
            &InMemoryAttachmentSource::new(),
            &store,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::Source(SourceError::NotFound { .. })));
}

#[tokio::test]
async fn batch_mode_pages_and_only_refreshes_existing_items() {
    let store = MemoryTableStore::new(["AnimalId"]);
    store
        .seed(
            "Animals",
            Record::from_iter([("AnimalId", "A1"), ("LastIngestedDateTime", "2017-01-01T00:00:00Z")]),
        )
        .unwrap();

    let config = IngestConfig {
        write_mode: WriteMode::Batch,
        page_size: 1,
        ..IngestConfig::default()
    };
    let pipeline = IngestionPipeline::new(config).unwrap();
    let report = pipeline
        .run(&notification("2017-08-13T01:58:56.622Z"), &source(TWO_ANIMALS), &store)
        .await
        .unwrap();

    assert_eq!(report.calls, 2);
    assert_eq!(report.written, 1);
    assert_eq!(report.rejected_keys, vec!["A2".to_string()]);
    assert_eq!(
        store.get("Animals", "A1").unwrap().get_text("AnimalName"),
        Some("Rex")
    );
}

#[tokio::test]
async fn directory_source_feeds_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("msg-1.csv"), TWO_ANIMALS).unwrap();

    let store = MemoryTableStore::new(["AnimalId"]);
    let config = IngestConfig {
        table_name: Some("AnimalsStaging".to_string()),
        ..IngestConfig::default()
    };
    let report = IngestionPipeline::new(config)
        .unwrap()
        .run(
            &notification("2017-08-13T01:58:56.622Z"),
            &DirectoryAttachmentSource::new(dir.path()),
            &store,
        )
        .await
        .unwrap();

    assert_eq!(report.table, "AnimalsStaging");
    assert_eq!(store.items("AnimalsStaging").len(), 2);
}

#[test]
fn condition_value_is_the_records_own_timestamp() {
    let record = Record::from_iter([("id", "1"), ("LastIngestedDateTime", "2017-08-13T01:58:56.622Z")]);
    let request = WriteRequestBuilder::new("Animals")
        .build_put_requests(vec![record])
        .unwrap()
        .remove(0);

    assert_eq!(request.condition.value(), "2017-08-13T01:58:56.622Z");
    let wire = serde_json::to_value(&request).unwrap();
    assert_eq!(
        wire["ExpressionAttributeValues"][":NewIngestedDateTime"],
        "2017-08-13T01:58:56.622Z"
    );
    assert_eq!(wire["ExpressionAttributeNames"]["#OldIngestedDateTime"], "LastIngestedDateTime");
}
