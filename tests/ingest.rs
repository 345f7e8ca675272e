mod common;

use std::io::Cursor;
use serde_json::json;
use tempfile::TempDir;
use segdex::ErrorKind;
use segdex::ingest::{ingest_columnar_json, ingest_json_lines, IngestOptions};
use common::{ids, open};

const LINES: &str = r#"{"id": 1, "title": "first record", "price": 3}
{"id": 2, "title": "second record"}

not json at all
{"id": 4, "title": "bad price", "price": "cheap"}
{"id": 5, "title": "last record", "color": "green"}
"#;

#[test]
fn test_json_lines_skip_bad_records() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let options = IngestOptions {
        batch_size: 2,
        ..IngestOptions::default()
    };

    let report = ingest_json_lines(&db, Cursor::new(LINES), &options).unwrap();
    assert_eq!(report.indexed, 3);
    let failed: Vec<usize> = report.failed.iter().map(|f| f.line).collect();
    assert_eq!(failed, vec![4, 5]);

    // Committed by the ingest itself
    let mut found = ids(&db, "record");
    found.sort_unstable();
    assert_eq!(found, vec![1, 2, 5]);
    assert_eq!(ids(&db, "color:green"), vec![5]);
}

#[test]
fn test_json_lines_strict_mode_stops() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let options = IngestOptions {
        continue_on_error: false,
        ..IngestOptions::default()
    };

    let err = ingest_json_lines(&db, Cursor::new(LINES), &options).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse);
    assert!(err.context.starts_with("line 4"), "{}", err.context);
}

#[test]
fn test_columnar_input() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let input = json!({
        "id": [10, 11, 12],
        "title": ["north wind", "south wind", null],
        "price": [1, 2, 3],
        "emb": [[0.0, 1.0], [1.0, 0.0], [0.5, 0.5]],
    });

    let report = ingest_columnar_json(&db, &input, &IngestOptions::default()).unwrap();
    assert_eq!(report.indexed, 3);
    assert!(report.failed.is_empty());

    let mut found = ids(&db, "wind");
    found.sort_unstable();
    assert_eq!(found, vec![10, 11]);
    assert_eq!(ids(&db, "price:3"), vec![12]);
    assert_eq!(db.knn("emb", vec![1.0, 0.0], 1).unwrap().hits[0].doc_id.0, 11);
}

#[test]
fn test_columnar_input_reports_rows() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let input = json!({
        "id": [1, 2],
        "price": [4, "four"],
    });

    let report = ingest_columnar_json(&db, &input, &IngestOptions::default()).unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].line, 2);

    let ragged = json!({"id": [1, 2], "price": [4]});
    let err = ingest_columnar_json(&db, &ragged, &IngestOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}
