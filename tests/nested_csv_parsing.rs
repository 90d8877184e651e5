use export_ingest::IngestionError;
use export_ingest::ingestion::{FieldSanitizer, NestedCsvOptions, parse_nested_csv};
use export_ingest::types::GroupMap;
use serde_json::json;

fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(format!("tests/fixtures/{name}")).unwrap()
}

#[test]
fn documented_example_parses_into_two_nested_records() {
    let records = parse_nested_csv(&fixture("documented_example.csv"), &NestedCsvOptions::default()).unwrap();

    assert_eq!(
        serde_json::to_value(&records).unwrap(),
        json!([
            {
                "IdProperty": "1",
                "BaseProperty1": "BP1_A",
                "SubType1": [
                    { "P1": "ST1P1_A", "P2": "ST1P2_A" },
                    { "P1": "ST1P1_B", "P2": "ST1P2_B" }
                ],
                "SubType2": [
                    { "P1": "ST2P1_A", "P2": "ST2P2_A" },
                    { "P1": "ST2P1_B", "P2": "ST2P2_B" }
                ]
            },
            {
                "IdProperty": "2",
                "BaseProperty1": "BP1_C",
                "SubType2": [
                    { "P1": "ST2P1_C", "P2": "ST2P2_C" }
                ]
            }
        ])
    );
}

#[test]
fn group_map_lists_fields_per_sub_group() {
    let groups = GroupMap::from_headers(&[
        "__RowSubType",
        "BaseProperty1",
        "BaseProperty2",
        "SubType1:SubType1Property1",
        "SubType1:SubType1Property2",
        "SubType2:SubType2Property1",
    ])
    .unwrap();

    assert_eq!(groups.field_names(""), Some(vec!["BaseProperty1", "BaseProperty2"]));
    assert_eq!(
        groups.field_names("SubType1"),
        Some(vec!["SubType1Property1", "SubType1Property2"])
    );
    assert_eq!(groups.field_names("SubType2"), Some(vec!["SubType2Property1"]));
    assert_eq!(groups.sentinel_column(), 0);
}

#[test]
fn sanitized_export_normalizes_names_dates_and_empties() {
    let sanitizer = FieldSanitizer::new(chrono_tz::America::Los_Angeles);
    let records = parse_nested_csv(&fixture("animal_memos_export.csv"), &sanitizer.parse_options()).unwrap();

    assert_eq!(
        serde_json::to_value(&records).unwrap(),
        json!([
            {
                "AnimalId": "A1001",
                "AnimalName": "Rex",
                "IntakeDateTime": "2017-08-12T18:56:00Z",
                "DateOfBirth": "2010-02-04T08:00:00Z",
                "BehaviorCategory": "Handling",
                "BehaviorTest": "Leash",
                "Memos": [
                    {
                        "MemoText": "Friendly, likes \"treats\"",
                        "MemoDateTime": "2017-08-12T18:56:00Z",
                        "CreatedBy": "jdoe"
                    },
                    {
                        "MemoText": "Multi-line\nmemo",
                        "MemoDateTime": "2017-08-13T16:05:00Z",
                        "CreatedBy": "asmith"
                    }
                ]
            },
            {
                "AnimalId": "A1002",
                "AnimalName": "Mittens",
                "IntakeDateTime": "2017-08-12T17:00:00Z",
                "ExpiresDateTime": "2018-01-01T01:00:00Z"
            }
        ])
    );
}

#[test]
fn sub_group_row_before_any_base_row_is_rejected() {
    let input = "__RowSubType,Id,Memos:Text\nMemos,,orphan\n,1,\n";
    let err = parse_nested_csv(input.as_bytes(), &NestedCsvOptions::default()).unwrap_err();
    assert!(matches!(err, IngestionError::Sequencing { row: 2 }));
}

#[test]
fn bad_date_reports_user_row_and_column() {
    let sanitizer = FieldSanitizer::new(chrono_tz::America::Los_Angeles);
    let input = "__RowSubType,Id,Intake Date\n,1,8/12/2017 11:56 AM\n,2,yesterday\n";
    let err = parse_nested_csv(input.as_bytes(), &sanitizer.parse_options()).unwrap_err();

    match err {
        IngestionError::Format { row, column, raw, .. } => {
            assert_eq!(row, 3);
            assert_eq!(column, "IntakeDateTime");
            assert_eq!(raw, "yesterday");
        }
        other => panic!("expected format error, got {other:?}"),
    }
}
