//! Header and value normalization for exported columns.
//!
//! Column names are cleaned up by an ordered list of rewrite rules (see [`sanitize_column_name`]);
//! values are sanitized by a [`FieldSanitizer`], which elides empty strings and rewrites date
//! columns from the export's local `M/D/YYYY h:m AM` form into UTC ISO-8601.

use std::sync::{Arc, LazyLock};

use chrono::{LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::{IngestionError, IngestionResult};

use super::nested_csv::NestedCsvOptions;

/// Input pattern of exported date/time values (`M/D/YYYY h:m AM|PM`).
pub const EXPORT_DATE_TIME_FORMAT: &str = "%m/%d/%Y %I:%M %p";

/// Output pattern: UTC ISO-8601 with second precision.
pub const ISO_8601_UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Suffix marking a sanitized column name as date-like.
pub const DATE_TIME_SUFFIX: &str = "DateTime";

/// Date-like column whose name does not end in [`DATE_TIME_SUFFIX`].
pub const DATE_OF_BIRTH_FIELD: &str = "DateOfBirth";

/// Ordered `(pattern, replacement)` rewrite rules. Later rules see the output of earlier ones.
static COLUMN_NAME_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"#", "Id"),
        (r" of ", " Of "),
        (r" ", ""),
        (r"/", ""),
        (r"\(login\)", ""),
        (r"Sub-location", "SubLocation"),
        (r"Sub-type", "SubType"),
        (r"ID", "Id"),
        // Must run after spaces and slashes are gone so "Review Date" and "Foo/Date" match.
        (r"Date$", "DateTime"),
        (r"^Expires$", "ExpiresDateTime"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("column name rule must be a valid regex"),
            replacement,
        )
    })
    .collect()
});

/// Normalize an exported column name into an identifier.
///
/// ```rust
/// use export_ingest::ingestion::sanitize::sanitize_column_name;
///
/// assert_eq!(sanitize_column_name("Animal #"), "AnimalId");
/// assert_eq!(sanitize_column_name("Date of Birth"), "DateOfBirth");
/// assert_eq!(sanitize_column_name("Review Date"), "ReviewDateTime");
/// ```
pub fn sanitize_column_name(name: &str) -> String {
    COLUMN_NAME_RULES
        .iter()
        .fold(name.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

/// Returns `true` if values of the (sanitized) field are exported dates.
pub fn is_date_time_field(field: &str) -> bool {
    field.ends_with(DATE_TIME_SUFFIX) || field == DATE_OF_BIRTH_FIELD
}

/// Value sanitizer bound to the export's assumed input time zone.
///
/// The export carries no offset information, so the zone is configuration rather than data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSanitizer {
    input_time_zone: Tz,
}

impl FieldSanitizer {
    /// Create a sanitizer that interprets exported dates in `input_time_zone`.
    pub fn new(input_time_zone: Tz) -> Self {
        Self { input_time_zone }
    }

    /// The configured input time zone.
    pub fn input_time_zone(&self) -> Tz {
        self.input_time_zone
    }

    /// Sanitize one raw value of `field`.
    ///
    /// - `""` returns `Ok(None)`: the property must be dropped, not stored empty.
    /// - Date-like fields (see [`is_date_time_field`]) are converted to UTC ISO-8601.
    /// - Everything else is returned unchanged.
    pub fn sanitize_value(&self, raw: &str, field: &str) -> IngestionResult<Option<String>> {
        if raw.is_empty() {
            return Ok(None);
        }
        if is_date_time_field(field) {
            return self.sanitize_date_time(raw, field).map(Some);
        }
        Ok(Some(raw.to_string()))
    }

    /// Convert an exported local date/time into UTC ISO-8601 with second precision.
    ///
    /// Ambiguous local times (DST fall-back) resolve to the earlier instant; local times inside a
    /// DST gap are shifted forward by one hour.
    pub fn sanitize_date_time(&self, raw: &str, field: &str) -> IngestionResult<String> {
        let naive = NaiveDateTime::parse_from_str(raw.trim(), EXPORT_DATE_TIME_FORMAT).map_err(
            |e| IngestionError::Format {
                row: 0,
                column: field.to_string(),
                raw: raw.to_string(),
                message: format!("expected M/D/YYYY h:m AM|PM: {e}"),
            },
        )?;

        let local = match self.input_time_zone.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => {
                let shifted = naive + TimeDelta::hours(1);
                self.input_time_zone
                    .from_local_datetime(&shifted)
                    .earliest()
                    .ok_or_else(|| IngestionError::Format {
                        row: 0,
                        column: field.to_string(),
                        raw: raw.to_string(),
                        message: format!(
                            "local time does not exist in {}",
                            self.input_time_zone.name()
                        ),
                    })?
            }
        };

        Ok(local
            .with_timezone(&Utc)
            .format(ISO_8601_UTC_FORMAT)
            .to_string())
    }

    /// Parser options that sanitize headers and values with this sanitizer.
    pub fn parse_options(&self) -> NestedCsvOptions {
        let sanitizer = *self;
        NestedCsvOptions {
            map_headers: Arc::new(sanitize_column_name),
            map_value: Arc::new(move |raw: &str, field: &str| sanitizer.sanitize_value(raw, field)),
        }
    }
}
