mod common;

use std::fs;
use serde_json::json;
use tempfile::TempDir;
use segdex::schema::schema::FieldDefinition;
use segdex::{Config, Database, DocId, ErrorKind, FieldType, FieldValue, Schema, SearchOptions};
use common::{body, config, ids, open};

fn segment_files(dir: &TempDir) -> Vec<std::path::PathBuf> {
    fs::read_dir(dir.path().join("segments"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("seg"))
        .collect()
}

#[test]
fn test_reopen_keeps_documents_and_ids() {
    let dir = TempDir::new().unwrap();
    {
        let db = open(&dir);
        db.add_record(&body(7, "persisted text")).unwrap();
        db.add_record(&json!({"body": "no id given"})).unwrap();
        db.commit().unwrap();
    }

    let db = open(&dir);
    assert_eq!(ids(&db, "persisted"), vec![7]);
    assert_eq!(db.stats().doc_count, 2);
    assert_eq!(db.stats().generation, 1);

    // Generated ids continue past everything seen before the restart
    let id = db.add_record(&json!({"body": "after restart"})).unwrap();
    assert!(id.0 > 8, "id {} was reused", id);
}

#[test]
fn test_reopen_keeps_deletes() {
    let dir = TempDir::new().unwrap();
    {
        let db = open(&dir);
        db.add_records(&[body(1, "keep me"), body(2, "drop me")]).unwrap();
        db.commit().unwrap();
        db.delete_document(DocId(2));
        db.commit().unwrap();
    }

    let db = open(&dir);
    assert_eq!(ids(&db, "me"), vec![1]);
    assert_eq!(db.stats().deleted_count, 1);
    assert!(db.get_document(DocId(2)).unwrap().is_none());
}

#[test]
fn test_uncommitted_work_is_lost_on_close() {
    let dir = TempDir::new().unwrap();
    {
        let db = open(&dir);
        db.add_record(&body(1, "committed")).unwrap();
        db.commit().unwrap();
        db.add_record(&body(2, "buffered only")).unwrap();
    }

    let db = open(&dir);
    assert_eq!(db.stats().doc_count, 1);
    assert!(ids(&db, "buffered").is_empty());
}

#[test]
fn test_open_removes_leftover_files() {
    let dir = TempDir::new().unwrap();
    {
        let db = open(&dir);
        db.add_record(&body(1, "real segment")).unwrap();
        db.commit().unwrap();
    }
    let orphan = dir
        .path()
        .join("segments")
        .join("6f1c2a34-8d7e-4b51-9a0f-3c2d1e0b9a87.seg");
    fs::write(&orphan, b"never committed").unwrap();
    let partial = dir.path().join("segments").join("6f1c2a34-8d7e-4b51-9a0f-3c2d1e0b9a88.seg.tmp");
    fs::write(&partial, b"half written").unwrap();
    let manifest_tmp = dir.path().join("meta").join("MANIFEST.tmp");
    fs::write(&manifest_tmp, b"{").unwrap();

    let db = open(&dir);
    assert!(!orphan.exists());
    assert!(!partial.exists());
    assert!(!manifest_tmp.exists());
    assert_eq!(segment_files(&dir).len(), 1);
    assert_eq!(ids(&db, "real"), vec![1]);
}

#[test]
fn test_merged_away_segments_are_deleted() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    for i in 1..=3 {
        db.add_record(&body(i, "segment per commit")).unwrap();
        db.commit().unwrap();
    }
    assert_eq!(segment_files(&dir).len(), 3);

    db.force_merge(1).unwrap();
    assert_eq!(db.stats().segment_count, 1);
    assert_eq!(segment_files(&dir).len(), 1);
}

#[test]
fn test_schema_must_match_stored_schema() {
    let dir = TempDir::new().unwrap();
    drop(open(&dir));

    let other = Schema::new().add_text_field("body", None);
    let err = Database::open_with_schema(other, config(&dir)).err().unwrap();
    assert_eq!(err.kind, ErrorKind::SchemaMismatch);

    // The stored schema is picked up without restating it
    let db = Database::open(config(&dir)).unwrap();
    assert_eq!(db.schema(), &common::schema());
}

#[test]
fn test_open_without_index_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = Database::open(config(&dir)).err().unwrap();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn test_corrupted_segment_is_reported() {
    let dir = TempDir::new().unwrap();
    {
        let db = open(&dir);
        db.add_record(&body(1, "soon corrupted")).unwrap();
        db.commit().unwrap();
    }
    let path = segment_files(&dir).pop().unwrap();
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&path, bytes).unwrap();

    let err = Database::open_with_schema(common::schema(), config(&dir)).err().unwrap();
    assert_eq!(err.kind, ErrorKind::Corrupted);
}

#[test]
fn test_config_from_toml_drives_open() {
    let dir = TempDir::new().unwrap();
    let raw = format!(
        "storage_path = {:?}\ndefault_operator = \"and\"\nbackground_merge = false\n",
        dir.path().display().to_string()
    );
    let config = Config::from_toml_str(&raw).unwrap();
    let db = Database::open_with_schema(common::schema(), config).unwrap();
    db.add_records(&[body(1, "red fox"), body(2, "red dog")]).unwrap();
    db.commit().unwrap();

    assert_eq!(ids(&db, "red fox"), vec![1]);
}

fn unstored_schema() -> Schema {
    let mut price = FieldDefinition::new("price", FieldType::Numeric);
    price.stored = false;
    let mut color = FieldDefinition::new("color", FieldType::Keyword);
    color.stored = false;
    Schema::new().add_text_field("title", None).with_field(price).with_field(color)
}

type Observed = (Vec<DocId>, Vec<(String, u64)>, Option<FieldValue>, Option<FieldValue>);

fn observe(db: &Database) -> Observed {
    let options = SearchOptions::from_config(db.config())
        .with_sort("price", false)
        .with_facet("color");
    let results = db.search_with("*", &options, None).unwrap();
    let facets = results.facets["color"]
        .iter()
        .map(|f| (f.value.clone(), f.count))
        .collect();
    (
        results.doc_ids(),
        facets,
        db.field_value(DocId(2), "price").unwrap(),
        db.field_value(DocId(2), "color").unwrap(),
    )
}

#[test]
fn test_reopen_keeps_unstored_columnar_fields() {
    let dir = TempDir::new().unwrap();
    let before = {
        let db = Database::open_with_schema(unstored_schema(), config(&dir)).unwrap();
        db.add_records(&[
            json!({"id": 1, "title": "lamp", "price": 30, "color": "red"}),
            json!({"id": 2, "title": "desk", "price": 10, "color": "blue"}),
            json!({"id": 3, "title": "chair", "price": 20, "color": "red"}),
        ])
        .unwrap();
        db.commit().unwrap();
        observe(&db)
    };
    assert_eq!(before.0, vec![DocId(2), DocId(3), DocId(1)]);
    assert_eq!(before.1, vec![("red".to_string(), 2), ("blue".to_string(), 1)]);
    assert_eq!(before.2, Some(FieldValue::Number(10.0)));
    assert_eq!(before.3, Some(FieldValue::Keyword("blue".into())));

    {
        let db = Database::open_with_schema(unstored_schema(), config(&dir)).unwrap();
        assert_eq!(observe(&db), before);
    }

    // Without the cache, values come from segment columns and keyword terms
    let mut no_cache = config(&dir);
    no_cache.columnar_cache = false;
    let db = Database::open_with_schema(unstored_schema(), no_cache).unwrap();
    assert_eq!(observe(&db), before);
}
