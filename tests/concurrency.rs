mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use serde_json::json;
use tempfile::TempDir;
use segdex::{DocId, SearchOptions};
use common::{open, open_with};

const WRITERS: u64 = 4;
const PER_WRITER: u64 = 250;

#[test]
fn test_concurrent_writers_lose_nothing() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(open_with(&dir, |c| c.writer_batch_size = 100));

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..PER_WRITER {
                    let id = w * PER_WRITER + i + 1;
                    db.add_record(&json!({"id": id, "body": format!("shared w{}", w)}))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    db.commit().unwrap();

    let total = WRITERS * PER_WRITER;
    assert_eq!(db.stats().doc_count, total);

    let options = SearchOptions::from_config(db.config()).with_max_results(total as usize);
    let results = db.search_with("shared", &options, None).unwrap();
    assert_eq!(results.total_hits as u64, total);
    let seen: HashSet<u64> = results.hits.iter().map(|h| h.doc_id.0).collect();
    assert_eq!(seen.len() as u64, total);
    assert!((1..=total).all(|id| seen.contains(&id)));

    for w in 0..WRITERS {
        let hits = db.search_with(&format!("w{}", w), &options, None).unwrap();
        assert_eq!(hits.total_hits as u64, PER_WRITER);
    }
}

#[test]
fn test_generated_ids_are_unique_across_threads() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(open(&dir));

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                (0..PER_WRITER)
                    .map(|_| db.add_record(&json!({"body": "anonymous"})).unwrap())
                    .collect::<Vec<DocId>>()
            })
        })
        .collect();
    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id), "id {} handed out twice", id);
        }
    }
    db.commit().unwrap();
    assert_eq!(db.stats().doc_count, WRITERS * PER_WRITER);
}

#[test]
fn test_readers_see_whole_commits_only() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(open(&dir));
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut searches = 0;
            while !done.load(Ordering::Acquire) {
                // Each commit adds a pair; a torn view would show an odd count
                let results = db.search("pair").unwrap();
                assert_eq!(results.total_hits % 2, 0, "saw half a commit");
                searches += 1;
            }
            searches
        })
    };

    for round in 0..50u64 {
        db.add_records(&[
            json!({"id": round * 2 + 1, "body": "pair left"}),
            json!({"id": round * 2 + 2, "body": "pair right"}),
        ])
        .unwrap();
        db.commit().unwrap();
    }
    done.store(true, Ordering::Release);

    let searches = reader.join().unwrap();
    assert!(searches > 0);
    assert_eq!(db.search("pair").unwrap().total_hits, 100);
}

#[test]
fn test_commits_from_many_threads() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(open(&dir));

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..20 {
                    let id = w * 100 + i + 1;
                    db.add_record(&json!({"id": id, "body": "racing commits"})).unwrap();
                    if i % 5 == 4 {
                        db.commit().unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    db.commit().unwrap();

    assert_eq!(db.stats().doc_count, WRITERS * 20);
    assert_eq!(db.stats().buffered_docs, 0);
}
