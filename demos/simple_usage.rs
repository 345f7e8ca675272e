/// Walkthrough of the segdex API:
/// - indexing JSON records and committing
/// - query syntax (terms, fields, phrases, ranges, negation)
/// - sorting, facets and nearest-neighbour search
/// - deletes, merging and statistics

use segdex::{Config, Database, DocId, Schema, SearchOptions};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("segdex-demo");
    let _ = std::fs::remove_dir_all(&dir);

    println!("Creating index at {}", dir.display());
    let schema = Schema::new()
        .add_text_field("title", None)
        .add_text_field("body", Some("english".to_string()))
        .add_keyword_field("topic")
        .add_numeric_field("year")
        .add_vector_field("embedding", 3);
    let db = Database::open_with_schema(schema, Config::default().with_storage_path(&dir))?;

    // Step 1: index
    db.add_records(&[
        json!({"id": 1, "title": "Rust Programming", "body": "Learning the Rust language",
               "topic": "lang", "year": 2015, "embedding": [0.9, 0.1, 0.0]}),
        json!({"id": 2, "title": "Database Systems", "body": "Storing and indexing documents",
               "topic": "db", "year": 2009, "embedding": [0.1, 0.9, 0.0]}),
        json!({"id": 3, "title": "Search Engines", "body": "Inverted indexes and ranking",
               "topic": ["db", "search"], "year": 2021, "embedding": [0.2, 0.7, 0.3]}),
    ])?;
    let generation = db.commit()?;
    println!("Committed generation {}\n", generation);

    // Step 2: queries
    for query in [
        "rust",
        "title:database",
        "body:\"inverted indexes\"",
        "indexing OR ranking",
        "topic:db -year:[2020 TO *]",
        "*",
    ] {
        let results = db.search(query)?;
        println!("  {:<32} -> {:?}", query, results.doc_ids());
    }

    // Step 3: sorting and facets
    let options = SearchOptions::from_config(db.config())
        .with_sort("year", true)
        .with_facet("topic")
        .with_documents();
    let results = db.search_with("*", &options, None)?;
    println!("\nNewest first:");
    for hit in &results.hits {
        println!("  {} {:?}", hit.doc_id, hit.sort_value);
    }
    for count in &results.facets["topic"] {
        println!("  topic {} = {}", count.value, count.count);
    }

    // Step 4: nearest neighbours
    let nearest = db.knn("embedding", vec![0.0, 1.0, 0.0], 2)?;
    println!("\nClosest to [0, 1, 0]: {:?}", nearest.doc_ids());

    // Step 5: delete, merge, stats
    db.delete_document(DocId(2));
    db.commit()?;
    db.force_merge(1)?;
    println!("\nAfter delete and merge: {:?}", db.search("*")?.doc_ids());
    println!("{}", serde_json::to_string_pretty(&db.stats())?);

    Ok(())
}
