#![allow(dead_code)]

use serde_json::{json, Value};
use tempfile::TempDir;
use segdex::{Config, Database, DocId, Schema};

pub fn schema() -> Schema {
    Schema::new()
        .add_text_field("title", None)
        .add_text_field("body", None)
        .add_keyword_field("color")
        .add_numeric_field("price")
        .add_vector_field("emb", 2)
}

pub fn config(dir: &TempDir) -> Config {
    Config {
        background_merge: false,
        ..Config::default().with_storage_path(dir.path())
    }
}

pub fn open(dir: &TempDir) -> Database {
    Database::open_with_schema(schema(), config(dir)).unwrap()
}

pub fn open_with(dir: &TempDir, tweak: impl FnOnce(&mut Config)) -> Database {
    let mut config = config(dir);
    tweak(&mut config);
    Database::open_with_schema(schema(), config).unwrap()
}

pub fn body(id: u64, text: &str) -> Value {
    json!({"id": id, "body": text})
}

pub fn ids(db: &Database, query: &str) -> Vec<u64> {
    db.search(query).unwrap().hits.iter().map(|h| h.doc_id.0).collect()
}

pub fn doc_ids(values: &[u64]) -> Vec<DocId> {
    values.iter().copied().map(DocId).collect()
}
