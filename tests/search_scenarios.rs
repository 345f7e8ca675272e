mod common;

use serde_json::json;
use tempfile::TempDir;
use segdex::{ScoringMode, SearchOptions};
use common::{body, ids, open};

fn sorted(mut v: Vec<u64>) -> Vec<u64> {
    v.sort_unstable();
    v
}

fn quick_fox(dir: &TempDir) -> segdex::Database {
    let db = open(dir);
    db.add_records(&[body(1, "the quick brown fox"), body(2, "the lazy dog")])
        .unwrap();
    db.commit().unwrap();
    db
}

#[test]
fn test_term_and_boolean_queries() {
    let dir = TempDir::new().unwrap();
    let db = quick_fox(&dir);

    assert_eq!(ids(&db, "fox"), vec![1]);
    assert_eq!(sorted(ids(&db, "the")), vec![1, 2]);
    assert!(ids(&db, "fox AND dog").is_empty());
    assert_eq!(sorted(ids(&db, "fox OR dog")), vec![1, 2]);
    assert_eq!(ids(&db, "the -fox"), vec![2]);
    assert_eq!(ids(&db, "FOX"), vec![1]);
}

#[test]
fn test_phrase_respects_order() {
    let dir = TempDir::new().unwrap();
    let db = quick_fox(&dir);

    assert_eq!(ids(&db, "\"brown fox\""), vec![1]);
    assert!(ids(&db, "\"fox brown\"").is_empty());
    assert!(ids(&db, "\"quick fox\"").is_empty());
}

#[test]
fn test_every_indexed_term_is_findable() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let texts = [
        "alpha beta gamma",
        "beta delta",
        "epsilon zeta eta theta",
        "gamma gamma omega",
    ];
    for (i, text) in texts.iter().enumerate() {
        db.add_record(&body(i as u64 + 1, text)).unwrap();
    }
    db.commit().unwrap();

    for (i, text) in texts.iter().enumerate() {
        for word in text.split_whitespace() {
            let found = ids(&db, &format!("body:{}", word));
            assert!(found.contains(&(i as u64 + 1)), "{} not found for doc {}", word, i + 1);
        }
    }
}

#[test]
fn test_deleted_document_is_gone() {
    let dir = TempDir::new().unwrap();
    let db = quick_fox(&dir);

    db.delete_document(segdex::DocId(1));
    db.commit().unwrap();

    assert!(ids(&db, "fox").is_empty());
    assert_eq!(ids(&db, "the"), vec![2]);
    assert!(db.get_document(segdex::DocId(1)).unwrap().is_none());
    assert_eq!(db.stats().doc_count, 1);
}

#[test]
fn test_repeated_search_is_identical() {
    let dir = TempDir::new().unwrap();
    let db = quick_fox(&dir);

    let first = db.search("the OR fox").unwrap();
    let second = db.search("the OR fox").unwrap();
    assert_eq!(first.hits, second.hits);
    assert_eq!(first.total_hits, second.total_hits);
}

#[test]
fn test_empty_index_returns_nothing() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);

    let results = db.search("anything").unwrap();
    assert!(results.hits.is_empty());
    assert_eq!(results.total_hits, 0);
    assert!(!results.incomplete);
}

#[test]
fn test_uncommitted_documents_are_invisible() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.add_record(&body(1, "pending words")).unwrap();

    assert!(ids(&db, "pending").is_empty());
    db.commit().unwrap();
    assert_eq!(ids(&db, "pending"), vec![1]);
}

#[test]
fn test_keyword_and_numeric_fields() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.add_records(&[
        json!({"id": 1, "color": "Red", "price": 5}),
        json!({"id": 2, "color": "blue", "price": 15}),
        json!({"id": 3, "color": ["red", "blue"], "price": 25.5}),
    ])
    .unwrap();
    db.commit().unwrap();

    // Keywords are matched exactly
    assert_eq!(ids(&db, "color:Red"), vec![1]);
    assert_eq!(ids(&db, "color:red"), vec![3]);
    assert_eq!(sorted(ids(&db, "color:blue")), vec![2, 3]);

    assert_eq!(sorted(ids(&db, "price:[5 TO 15]")), vec![1, 2]);
    assert_eq!(ids(&db, "price:{5 TO 15]"), vec![2]);
    assert_eq!(sorted(ids(&db, "price:[10 TO *]")), vec![2, 3]);
    assert_eq!(ids(&db, "price:25.5"), vec![3]);
    assert_eq!(ids(&db, "color:blue AND price:[20 TO 30]"), vec![3]);
}

#[test]
fn test_scores_do_not_depend_on_segment_layout() {
    let records = vec![
        body(1, "rust search engine"),
        body(2, "search the web"),
        body(3, "an engine for rust"),
        body(4, "segments and merges"),
    ];

    let one_dir = TempDir::new().unwrap();
    let one = open(&one_dir);
    one.add_records(&records).unwrap();
    one.commit().unwrap();

    let many_dir = TempDir::new().unwrap();
    let many = open(&many_dir);
    for record in &records {
        many.add_record(record).unwrap();
        many.commit().unwrap();
    }
    assert_eq!(many.stats().segment_count, 4);

    for query in ["rust", "search engine", "rust OR merges"] {
        let a = one.search(query).unwrap();
        let b = many.search(query).unwrap();
        assert_eq!(a.doc_ids(), b.doc_ids(), "order differs for {}", query);
        for (x, y) in a.hits.iter().zip(&b.hits) {
            assert!((x.score - y.score).abs() < 1e-5, "{}: {} vs {}", query, x.score, y.score);
        }
    }
}

#[test]
fn test_scoring_modes_rank_rarer_terms_higher() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.add_records(&[
        body(1, "common rare"),
        body(2, "common words only"),
        body(3, "common again"),
    ])
    .unwrap();
    db.commit().unwrap();

    for mode in [ScoringMode::Bm25, ScoringMode::TfIdf] {
        let options = SearchOptions::from_config(db.config()).with_scoring(mode);
        let results = db.search_with("common OR rare", &options, None).unwrap();
        assert_eq!(results.hits[0].doc_id.0, 1, "{:?}", mode);
        assert_eq!(results.total_hits, 3);
        assert!(results.max_score >= results.hits[2].score);
    }
}

#[test]
fn test_max_results_limits_hits_not_total() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let records: Vec<_> = (1..=20).map(|i| body(i, "same words")).collect();
    db.add_records(&records).unwrap();
    db.commit().unwrap();

    let options = SearchOptions::from_config(db.config()).with_max_results(5);
    let results = db.search_with("same", &options, None).unwrap();
    assert_eq!(results.hits.len(), 5);
    assert_eq!(results.total_hits, 20);
    // Equal scores fall back to doc id order
    assert_eq!(
        results.hits.iter().map(|h| h.doc_id.0).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );
}
