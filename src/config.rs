//! Run configuration loaded from environment variables.

use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;

use crate::error::{IngestionError, IngestionResult};
use crate::write::{DEFAULT_TIMESTAMP_FIELD, DEFAULT_WRITE_CONCURRENCY, MAX_BATCH_PAGE_SIZE};

/// Zone the export's local date/times are interpreted in unless configured otherwise.
pub const DEFAULT_INPUT_TIME_ZONE: Tz = chrono_tz::America::Los_Angeles;

/// How write requests are issued to the table store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// One conditional put per record ("absent or older").
    #[default]
    Single,
    /// Paged batch writes ("older" only).
    Batch,
}

impl FromStr for WriteMode {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(WriteMode::Single),
            "batch" => Ok(WriteMode::Batch),
            other => Err(IngestionError::Config {
                message: format!("invalid write mode '{other}' (expected single|batch)"),
            }),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Single => write!(f, "single"),
            WriteMode::Batch => write!(f, "batch"),
        }
    }
}

/// Configuration of one ingestion deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Zone the export's local date/times are written in.
    pub input_time_zone: Tz,
    /// Puts per batch write.
    pub page_size: usize,
    /// Fixed target table. When `None`, the table is inferred from the notification subject.
    pub table_name: Option<String>,
    pub write_mode: WriteMode,
    /// Upper bound on concurrently outstanding store calls.
    pub write_concurrency: usize,
    /// Property holding the run's ingestion timestamp.
    pub timestamp_field: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input_time_zone: DEFAULT_INPUT_TIME_ZONE,
            page_size: MAX_BATCH_PAGE_SIZE,
            table_name: None,
            write_mode: WriteMode::Single,
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `INGEST_TIME_ZONE`: IANA zone name (default: `America/Los_Angeles`)
    /// - `INGEST_PAGE_SIZE`: puts per batch write (default: 25)
    /// - `INGEST_TABLE_NAME`: fixed target table (default: inferred from the subject)
    /// - `INGEST_WRITE_MODE`: `single` or `batch` (default: `single`)
    /// - `INGEST_WRITE_CONCURRENCY`: outstanding store calls (default: 16)
    /// - `INGEST_TIMESTAMP_FIELD`: timestamp property (default: `LastIngestedDateTime`)
    pub fn from_env() -> IngestionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a variable if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> IngestionResult<Self> {
        let mut config = Self::default();

        if let Some(zone) = lookup("INGEST_TIME_ZONE") {
            config.input_time_zone = parse_time_zone(&zone)?;
        }
        if let Some(size) = lookup("INGEST_PAGE_SIZE") {
            config.page_size = parse_count("INGEST_PAGE_SIZE", &size)?;
        }
        if let Some(table) = lookup("INGEST_TABLE_NAME") {
            let table = table.trim();
            config.table_name = (!table.is_empty()).then(|| table.to_string());
        }
        if let Some(mode) = lookup("INGEST_WRITE_MODE") {
            config.write_mode = mode.parse()?;
        }
        if let Some(concurrency) = lookup("INGEST_WRITE_CONCURRENCY") {
            config.write_concurrency = parse_count("INGEST_WRITE_CONCURRENCY", &concurrency)?;
        }
        if let Some(field) = lookup("INGEST_TIMESTAMP_FIELD") {
            config.timestamp_field = field.trim().to_string();
        }

        config.validate()?;
        tracing::debug!(
            time_zone = config.input_time_zone.name(),
            page_size = config.page_size,
            table = ?config.table_name,
            write_mode = %config.write_mode,
            write_concurrency = config.write_concurrency,
            "ingest configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> IngestionResult<()> {
        if self.page_size == 0 {
            return Err(config_error("page_size must be > 0"));
        }
        if self.write_concurrency == 0 {
            return Err(config_error("write_concurrency must be > 0"));
        }
        if self.timestamp_field.is_empty() {
            return Err(config_error("timestamp_field must not be empty"));
        }
        Ok(())
    }
}

/// Parse an IANA zone name such as `America/Los_Angeles`.
pub fn parse_time_zone(name: &str) -> IngestionResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| config_error(format!("unknown time zone '{}'", name.trim())))
}

fn parse_count(key: &str, value: &str) -> IngestionResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|e| config_error(format!("{key}: invalid number '{value}': {e}")))
}

fn config_error(message: impl Into<String>) -> IngestionError {
    IngestionError::Config {
        message: message.into(),
    }
}
