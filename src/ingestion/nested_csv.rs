//! Nested CSV ingestion.
//!
//! Reconstructs one-to-many relationships from a flat export. The `__RowSubType` sentinel column
//! decides what each row is:
//!
//! ```text
//! __RowSubType,IdProperty,BaseProperty1,SubType1:P1,SubType1:P2,SubType2:P1,SubType2:P2
//! ,1,BP1_A,,,,
//! SubType1,,,ST1P1_A,ST1P2_A,,
//! SubType1,,,ST1P1_B,ST1P2_B,,
//! SubType2,,,,,ST2P1_A,ST2P2_A
//! ,2,BP1_C,,,,
//! SubType2,,,,,ST2P1_C,ST2P2_C
//! ```
//!
//! yields two records: `{IdProperty: "1", BaseProperty1: "BP1_A", SubType1: [{P1, P2}, {P1, P2}],
//! SubType2: [{P1, P2}]}` and `{IdProperty: "2", BaseProperty1: "BP1_C", SubType2: [{P1, P2}]}`.
//!
//! A row with an empty sentinel starts a new record from the base columns; a row naming a
//! sub-group appends one entry built from that group's columns to the most recent record. Rows
//! whose every cell is empty are skipped and do not change the current record.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use tracing::debug;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{BASE_GROUP, GroupField, GroupMap, Record, SubRecord};

/// Header mapping hook, applied once to every header before grouping.
pub type HeaderMapper = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Value mapping hook: `(raw, field_name) -> Some(value)` to store, `None` to omit the property.
pub type ValueMapper = Arc<dyn Fn(&str, &str) -> IngestionResult<Option<String>> + Send + Sync>;

/// Options controlling nested CSV parsing.
///
/// Use [`Default`] for identity mapping, or
/// [`FieldSanitizer::parse_options`](super::sanitize::FieldSanitizer::parse_options) for export
/// sanitization.
#[derive(Clone)]
pub struct NestedCsvOptions {
    /// Applied to every header exactly once, before the group map is built.
    pub map_headers: HeaderMapper,
    /// Applied to every grouped cell value; `None` drops the property.
    pub map_value: ValueMapper,
}

impl Default for NestedCsvOptions {
    fn default() -> Self {
        Self {
            map_headers: Arc::new(|header: &str| header.to_string()),
            map_value: Arc::new(|raw: &str, _field: &str| -> IngestionResult<Option<String>> {
                Ok(Some(raw.to_string()))
            }),
        }
    }
}

impl fmt::Debug for NestedCsvOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedCsvOptions").finish_non_exhaustive()
    }
}

/// Parse nested CSV bytes (header row required) into records.
pub fn parse_nested_csv(input: &[u8], options: &NestedCsvOptions) -> IngestionResult<Vec<Record>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input);
    parse_nested_csv_from_reader(&mut rdr, options)
}

/// Parse nested CSV data from an existing CSV reader.
///
/// The whole input is consumed before returning: later rows attach to earlier records, so no
/// record is final until the last row has been read.
pub fn parse_nested_csv_from_reader<R: Read>(
    rdr: &mut csv::Reader<R>,
    options: &NestedCsvOptions,
) -> IngestionResult<Vec<Record>> {
    let mapped_headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| (options.map_headers)(h))
        .collect();
    let groups = GroupMap::from_headers(&mapped_headers)?;

    let mut acc = Accumulator::default();
    for (row_idx0, result) in rdr.records().enumerate() {
        // Report 1-based row number for users; +1 again because header is row 1.
        let user_row = row_idx0 + 2;
        let row = result?;
        acc = fold_row(acc, &row, user_row, &groups, options)?;
    }

    debug!(
        records = acc.records.len(),
        sub_groups = groups.sub_groups().count(),
        "parsed nested csv"
    );
    Ok(acc.records)
}

/// Fold state: records built so far and the index of the record sub-group rows attach to.
#[derive(Debug, Default)]
struct Accumulator {
    records: Vec<Record>,
    current: Option<usize>,
}

fn fold_row(
    mut acc: Accumulator,
    row: &csv::StringRecord,
    user_row: usize,
    groups: &GroupMap,
    options: &NestedCsvOptions,
) -> IngestionResult<Accumulator> {
    if row.iter().all(str::is_empty) {
        debug!(row = user_row, "skipping blank row");
        return Ok(acc);
    }

    let sentinel = row.get(groups.sentinel_column()).unwrap_or("");
    if sentinel.is_empty() {
        let base = groups.fields(BASE_GROUP).unwrap_or(&[]);
        let mut record = Record::new();
        for (name, value) in map_fields(row, user_row, base, options)? {
            record.insert(name, value);
        }
        acc.records.push(record);
        acc.current = Some(acc.records.len() - 1);
        return Ok(acc);
    }

    let group = (options.map_headers)(sentinel);
    let fields = groups
        .fields(&group)
        .filter(|_| !group.is_empty())
        .ok_or_else(|| IngestionError::Schema {
            message: format!(
                "row {user_row} names sub-group '{sentinel}' which has no columns. groups={:?}",
                groups.sub_groups().collect::<Vec<_>>()
            ),
        })?;
    let current = acc
        .current
        .ok_or(IngestionError::Sequencing { row: user_row })?;

    let entry: SubRecord = map_fields(row, user_row, fields, options)?.into_iter().collect();
    acc.records[current].push_group_entry(&group, entry);
    Ok(acc)
}

/// Map the cells of `fields`, dropping omitted values. Later duplicates of a field name win.
fn map_fields(
    row: &csv::StringRecord,
    user_row: usize,
    fields: &[GroupField],
    options: &NestedCsvOptions,
) -> IngestionResult<Vec<(String, String)>> {
    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        let raw = row.get(field.column).unwrap_or("");
        let mapped = (options.map_value)(raw, &field.name).map_err(|e| at_row(e, user_row))?;
        if let Some(value) = mapped {
            out.push((field.name.clone(), value));
        }
    }
    Ok(out)
}

fn at_row(err: IngestionError, user_row: usize) -> IngestionError {
    match err {
        IngestionError::Format {
            row: 0,
            column,
            raw,
            message,
        } => IngestionError::Format {
            row: user_row,
            column,
            raw,
            message,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> IngestionResult<Vec<Record>> {
        parse_nested_csv(input.as_bytes(), &NestedCsvOptions::default())
    }

    #[test]
    fn base_only_rows_become_flat_records() {
        let records = parse("__RowSubType,Key\n,Value\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_text("Key"), Some("Value"));
        assert_eq!(records[0].len(), 1);
    }

    #[test]
    fn sub_group_rows_attach_to_latest_base_row() {
        let input = "__RowSubType,Id,Memo:Text\n,1,\nMemo,,a\n,2,\nMemo,,b\nMemo,,c\n";
        let records = parse(input).unwrap();

        assert_eq!(records.len(), 2);
        let first: Vec<&str> = records[0]
            .get_group("Memo")
            .unwrap()
            .iter()
            .map(|e| e["Text"].as_str())
            .collect();
        let second: Vec<&str> = records[1]
            .get_group("Memo")
            .unwrap()
            .iter()
            .map(|e| e["Text"].as_str())
            .collect();
        assert_eq!(first, vec!["a"]);
        assert_eq!(second, vec!["b", "c"]);
    }

    #[test]
    fn sub_group_row_before_base_row_is_sequencing_error() {
        let err = parse("__RowSubType,Id,Memo:Text\nMemo,,a\n,1,\n").unwrap_err();
        assert!(matches!(err, IngestionError::Sequencing { row: 2 }), "{err:?}");
    }

    #[test]
    fn unknown_sub_group_is_schema_error() {
        let err = parse("__RowSubType,Id,Memo:Text\n,1,\nHold,,a\n").unwrap_err();
        assert!(matches!(err, IngestionError::Schema { .. }));
        assert!(err.to_string().contains("'Hold'"));
    }

    #[test]
    fn missing_sentinel_is_schema_error() {
        let err = parse("Id,Name\n1,Ada\n").unwrap_err();
        assert!(matches!(err, IngestionError::Schema { .. }));
    }

    #[test]
    fn header_with_two_separators_is_schema_error() {
        let err = parse("__RowSubType,A:B:C\n,x\n").unwrap_err();
        assert!(matches!(err, IngestionError::Schema { .. }));
    }

    #[test]
    fn blank_rows_are_skipped_without_resetting_current_record() {
        let input = "__RowSubType,Id,Memo:Text\n,1,\n,,\nMemo,,a\n";
        let records = parse(input).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_group("Memo").unwrap().len(), 1);
    }

    #[test]
    fn duplicate_field_names_in_a_group_keep_the_last_value() {
        // Documented limitation: no error, the rightmost column wins.
        let input = "__RowSubType,Id,Memo:Text,Memo:Text\n,1,,\nMemo,,first,second\n";
        let records = parse(input).unwrap();
        let memo = &records[0].get_group("Memo").unwrap()[0];
        assert_eq!(memo.len(), 1);
        assert_eq!(memo["Text"], "second");
    }

    #[test]
    fn quoted_fields_may_contain_delimiters_and_newlines() {
        let input = "__RowSubType,Id,Memo:Text\n,1,\nMemo,,\"line one, still\nline \"\"two\"\"\"\n";
        let records = parse(input).unwrap();
        let memo = &records[0].get_group("Memo").unwrap()[0];
        assert_eq!(memo["Text"], "line one, still\nline \"two\"");
    }

    #[test]
    fn omitted_values_are_not_stored() {
        let options = NestedCsvOptions {
            map_value: Arc::new(|raw: &str, _field: &str| -> IngestionResult<Option<String>> {
                Ok((!raw.is_empty()).then(|| raw.to_string()))
            }),
            ..Default::default()
        };
        let input = "__RowSubType,Id,Name,Memo:Text,Memo:By\n,1,,,\nMemo,,,hello,\n";
        let records = parse_nested_csv(input.as_bytes(), &options).unwrap();

        assert!(!records[0].contains("Name"));
        let memo = &records[0].get_group("Memo").unwrap()[0];
        assert_eq!(memo.get("Text").map(String::as_str), Some("hello"));
        assert!(!memo.contains_key("By"));
    }

    #[test]
    fn header_mapping_applies_to_group_names_and_sentinel_values() {
        let options = NestedCsvOptions {
            map_headers: Arc::new(|h: &str| h.replace(' ', "")),
            ..Default::default()
        };
        let input = "__RowSubType,Pet Id,Behavior Tests:Test Name\n,7,\nBehavior Tests,,Leash\n";
        let records = parse_nested_csv(input.as_bytes(), &options).unwrap();

        assert_eq!(records[0].get_text("PetId"), Some("7"));
        let tests = records[0].get_group("BehaviorTests").unwrap();
        assert_eq!(tests[0]["TestName"], "Leash");
    }

    #[test]
    fn format_errors_carry_the_row_number() {
        let options = NestedCsvOptions {
            map_value: Arc::new(|raw: &str, field: &str| -> IngestionResult<Option<String>> {
                Err(IngestionError::Format {
                    row: 0,
                    column: field.to_string(),
                    raw: raw.to_string(),
                    message: "bad".to_string(),
                })
            }),
            ..Default::default()
        };
        let err = parse_nested_csv(b"__RowSubType,Id\n,1\n", &options).unwrap_err();
        assert!(matches!(err, IngestionError::Format { row: 2, .. }), "{err:?}");
    }

    #[test]
    fn ragged_rows_surface_csv_errors() {
        let err = parse("__RowSubType,Id\n,1,extra\n").unwrap_err();
        assert!(matches!(err, IngestionError::Csv(_)));
    }
}
