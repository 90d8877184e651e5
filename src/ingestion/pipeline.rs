//! Ingestion pipeline entrypoint.
//!
//! [`IngestionPipeline::run`] turns one export notification into conditional table writes:
//!
//! 1. resolve the target table (configured, or inferred from the subject)
//! 2. fetch the CSV attachment from an [`AttachmentSource`]
//! 3. parse nested records with header/value sanitization
//! 4. inject derived properties, then the run's ingestion timestamp
//! 5. build conditional write requests and fan them out to a [`TableStore`]
//!
//! Steps 1-4 and request building are fully materialized before the first write, so a run that
//! fails on bad input never touches the store. If an [`IngestionObserver`] is configured, the run
//! outcome and every rejected write are reported to it.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{IngestConfig, WriteMode};
use crate::error::IngestionResult;
use crate::processing::{
    ConstantProperties, DerivedProperty, augment, default_derived_properties, inject_derived_properties,
};
use crate::source::AttachmentSource;
use crate::types::Record;
use crate::write::{TableStore, WriteExecutor, WriteMetrics, WriteRequestBuilder, WriteSummary};

use super::classify::infer_table_name;
use super::nested_csv::parse_nested_csv;
use super::observability::{
    IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats, severity_for_error,
};
use super::sanitize::FieldSanitizer;

/// The export email that triggers a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionNotification {
    /// Id used to fetch the attachment.
    pub message_id: String,
    /// Email subject, used to infer the table when none is configured.
    pub subject: String,
    /// Receipt time of the email (ISO-8601). Becomes the ingestion timestamp of every record.
    pub timestamp: String,
}

/// Options controlling pipeline reporting and enrichment.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct IngestionOptions {
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
    /// Composite properties injected into every record that has their base properties.
    pub derived_properties: Vec<DerivedProperty>,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .field("derived_properties", &self.derived_properties)
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
            derived_properties: default_derived_properties(),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub table: String,
    /// Records parsed from the attachment.
    pub records: usize,
    /// Items applied by the store.
    pub written: usize,
    /// Keys of items skipped because newer data was already stored.
    pub rejected_keys: Vec<String>,
    /// Store calls issued.
    pub calls: usize,
}

/// Orchestrates one run per notification.
#[derive(Debug)]
pub struct IngestionPipeline {
    config: IngestConfig,
    sanitizer: FieldSanitizer,
    executor: WriteExecutor,
    options: IngestionOptions,
}

impl IngestionPipeline {
    /// Build a pipeline for a validated configuration.
    pub fn new(config: IngestConfig) -> IngestionResult<Self> {
        config.validate()?;
        Ok(Self {
            sanitizer: FieldSanitizer::new(config.input_time_zone),
            executor: WriteExecutor::new(config.write_concurrency),
            options: IngestionOptions::default(),
            config,
        })
    }

    pub fn with_options(mut self, options: IngestionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Get a handle to real-time write metrics.
    pub fn metrics(&self) -> Arc<WriteMetrics> {
        self.executor.metrics()
    }

    /// Target table: the configured one, else the one inferred from `subject`.
    pub fn resolve_table(&self, subject: &str) -> IngestionResult<String> {
        match &self.config.table_name {
            Some(table) => Ok(table.clone()),
            None => infer_table_name(subject).map(str::to_string),
        }
    }

    /// Parse and enrich an attachment: sanitize, derive, then stamp with `ingested_at`.
    pub fn transform(&self, attachment: &[u8], ingested_at: &str) -> IngestionResult<Vec<Record>> {
        let parsed = parse_nested_csv(attachment, &self.sanitizer.parse_options())?;
        let derived = inject_derived_properties(&self.options.derived_properties, parsed);
        let constants = ConstantProperties::from([(
            self.config.timestamp_field.clone(),
            ingested_at.to_string(),
        )]);
        Ok(augment(&constants, derived))
    }

    /// Run the pipeline for one notification.
    ///
    /// When an observer is configured, this reports:
    ///
    /// - `on_write_rejected` for every skipped item, then `on_success` with run stats
    /// - `on_failure` on failure, with a computed severity
    /// - `on_alert` on failure when the computed severity is >= `alert_at_or_above`
    #[tracing::instrument(
        name = "ingest",
        skip(self, notification, source, store),
        fields(message_id = %notification.message_id)
    )]
    pub async fn run(
        &self,
        notification: &IngestionNotification,
        source: &dyn AttachmentSource,
        store: &dyn TableStore,
    ) -> IngestionResult<IngestionReport> {
        let mut ctx = IngestionContext {
            message_id: notification.message_id.clone(),
            subject: notification.subject.clone(),
            table: None,
        };

        let result = self.ingest(notification, source, store, &mut ctx).await;
        self.report(&ctx, &result);
        result
    }

    async fn ingest(
        &self,
        notification: &IngestionNotification,
        source: &dyn AttachmentSource,
        store: &dyn TableStore,
        ctx: &mut IngestionContext,
    ) -> IngestionResult<IngestionReport> {
        let table = self.resolve_table(&notification.subject)?;
        ctx.table = Some(table.clone());

        let attachment = source.fetch_attachment(&notification.message_id).await?;
        debug!(bytes = attachment.len(), table = %table, "fetched attachment");

        let records = self.transform(&attachment, &notification.timestamp)?;
        let record_count = records.len();

        let builder =
            WriteRequestBuilder::new(table.as_str()).with_timestamp_field(self.config.timestamp_field.as_str());
        let summary: WriteSummary = match self.config.write_mode {
            WriteMode::Single => {
                let requests = builder.build_put_requests(records)?;
                self.executor.put_all(store, requests).await?
            }
            WriteMode::Batch => {
                let batches = builder.build_batch_requests(records, self.config.page_size)?;
                self.executor.batch_write_all(store, batches).await?
            }
        };

        info!(
            table = %table,
            records = record_count,
            written = summary.written,
            rejected = summary.rejected(),
            calls = summary.calls,
            "ingestion run finished"
        );

        Ok(IngestionReport {
            table,
            records: record_count,
            written: summary.written,
            rejected_keys: summary.rejected_keys,
            calls: summary.calls,
        })
    }

    fn report(&self, ctx: &IngestionContext, result: &IngestionResult<IngestionReport>) {
        let Some(obs) = self.options.observer.as_ref() else {
            return;
        };
        match result {
            Ok(report) => {
                for key in &report.rejected_keys {
                    obs.on_write_rejected(ctx, key);
                }
                obs.on_success(
                    ctx,
                    IngestionStats {
                        records: report.records,
                        written: report.written,
                        rejected: report.rejected_keys.len(),
                    },
                );
            }
            Err(e) => {
                let sev = severity_for_error(e);
                obs.on_failure(ctx, sev, e);
                if sev >= self.options.alert_at_or_above {
                    obs.on_alert(ctx, sev, e);
                }
            }
        }
    }
}
