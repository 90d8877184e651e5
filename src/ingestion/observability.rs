use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use tracing::{error, info, warn};

use crate::error::IngestionError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (bad input, the run was aborted before writing).
    Error,
    /// Critical error (retrieval, I/O, or table-store failures).
    Critical,
}

/// Context about one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionContext {
    /// Id of the export email.
    pub message_id: String,
    /// Subject of the export email.
    pub subject: String,
    /// Target table, once resolved.
    pub table: Option<String>,
}

/// Stats reported on a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestionStats {
    /// Records parsed from the attachment.
    pub records: usize,
    /// Items applied by the table store.
    pub written: usize,
    /// Items skipped because newer data was already stored.
    pub rejected: usize,
}

/// Observer interface for ingestion outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when a run succeeds.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when a run fails.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}

    /// Called when a failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.on_failure(ctx, severity, error)
    }

    /// Called once per item whose write was skipped because newer data was already stored.
    fn on_write_rejected(&self, _ctx: &IngestionContext, _key: &str) {}
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }

    fn on_write_rejected(&self, ctx: &IngestionContext, key: &str) {
        for o in &self.observers {
            o.on_write_rejected(ctx, key);
        }
    }
}

/// Reports ingestion events as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        info!(
            message_id = %ctx.message_id,
            table = ctx.table.as_deref().unwrap_or(""),
            records = stats.records,
            written = stats.written,
            rejected = stats.rejected,
            "ingestion succeeded"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        error!(
            message_id = %ctx.message_id,
            subject = %ctx.subject,
            severity = ?severity,
            error = %error,
            "ingestion failed"
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        error!(
            alert = true,
            message_id = %ctx.message_id,
            subject = %ctx.subject,
            severity = ?severity,
            error = %error,
            "ingestion alert"
        );
    }

    fn on_write_rejected(&self, ctx: &IngestionContext, key: &str) {
        warn!(
            message_id = %ctx.message_id,
            table = ctx.table.as_deref().unwrap_or(""),
            key = %key,
            "newer data already stored"
        );
    }
}

/// Appends ingestion events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{} {line}", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.append_line(&format!(
            "ok message_id={} table={} records={} written={} rejected={}",
            ctx.message_id,
            ctx.table.as_deref().unwrap_or("-"),
            stats.records,
            stats.written,
            stats.rejected
        ));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "fail severity={:?} message_id={} subject={:?} err={}",
            severity, ctx.message_id, ctx.subject, error
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "ALERT severity={:?} message_id={} subject={:?} err={}",
            severity, ctx.message_id, ctx.subject, error
        ));
    }

    fn on_write_rejected(&self, ctx: &IngestionContext, key: &str) {
        self.append_line(&format!(
            "rejected message_id={} table={} key={}",
            ctx.message_id,
            ctx.table.as_deref().unwrap_or("-"),
            key
        ));
    }
}

/// Severity of a run failure.
///
/// Retrieval, I/O and store failures are infrastructure problems; everything else is bad input.
pub fn severity_for_error(e: &IngestionError) -> IngestionSeverity {
    match e {
        IngestionError::Io(_) | IngestionError::Source(_) | IngestionError::Store(_) => {
            IngestionSeverity::Critical
        }
        IngestionError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => IngestionSeverity::Critical,
            _ => IngestionSeverity::Error,
        },
        IngestionError::Schema { .. }
        | IngestionError::Sequencing { .. }
        | IngestionError::Format { .. }
        | IngestionError::Validation { .. }
        | IngestionError::Classification { .. }
        | IngestionError::Config { .. } => IngestionSeverity::Error,
    }
}
