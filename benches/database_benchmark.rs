use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use segdex::{Config, Database, Schema, ScoringMode, SearchOptions};

const WORDS: [&str; 12] = [
    "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "search", "engine", "segment", "merge",
];

fn schema() -> Schema {
    Schema::new()
        .add_text_field("title", None)
        .add_text_field("content", None)
        .add_keyword_field("category")
        .add_numeric_field("score")
        .add_vector_field("embedding", 8)
}

/// Helper to create test records
fn create_test_record(id: u64, content_size: usize) -> Value {
    let mut rng = rand::thread_rng();
    let content: String = (0..content_size)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ");
    let embedding: Vec<f32> = (0..8).map(|_| rng.gen_range(-1.0..1.0)).collect();

    json!({
        "id": id,
        "title": format!("Document {}", id),
        "content": content,
        "category": format!("category_{}", id % 10),
        "score": rng.gen_range(0.0..100.0),
        "embedding": embedding,
    })
}

fn open(dir: &TempDir) -> Database {
    let config = Config {
        background_merge: false,
        ..Config::default().with_storage_path(dir.path())
    };
    Database::open_with_schema(schema(), config).unwrap()
}

fn populated(dir: &TempDir, docs: u64, per_commit: u64) -> Database {
    let db = open(dir);
    let records: Vec<Value> = (0..docs).map(|id| create_test_record(id + 1, 50)).collect();
    for chunk in records.chunks(per_commit as usize) {
        db.add_records(chunk).unwrap();
        db.commit().unwrap();
    }
    db
}

/// Benchmark buffering single records
fn bench_single_insert(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);

    c.bench_function("single_record_insert", |b| {
        let mut id = 1;
        b.iter(|| {
            db.add_record(&create_test_record(id, 100)).unwrap();
            id += 1;
        });
    });
}

/// Benchmark batch insertion plus commit
fn bench_batch_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_commit");

    for batch_size in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let dir = TempDir::new().unwrap();
                let db = open(&dir);
                let mut next = 1u64;
                b.iter(|| {
                    let records: Vec<Value> = (next..next + batch_size)
                        .map(|id| create_test_record(id, 50))
                        .collect();
                    next += batch_size;
                    db.add_records(&records).unwrap();
                    db.commit().unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark query types over a multi-segment index
fn bench_search(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = populated(&dir, 10_000, 1_000);
    let mut group = c.benchmark_group("search");

    for (name, query) in [
        ("simple_term_search", "fox"),
        ("boolean_and_search", "quick AND fox"),
        ("boolean_or_search", "fox OR dog"),
        ("complex_boolean_search", "(quick OR lazy) AND fox -dog"),
        ("category_search", "category:category_5"),
        ("range_query_numeric", "score:[25 TO 75]"),
        ("phrase_query_exact", "content:\"quick brown fox\""),
        ("match_all", "*"),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| black_box(db.search(query).unwrap()));
        });
    }

    let tfidf = SearchOptions::from_config(db.config()).with_scoring(ScoringMode::TfIdf);
    group.bench_function("tfidf_term_search", |b| {
        b.iter(|| black_box(db.search_with("fox", &tfidf, None).unwrap()));
    });

    let sorted = SearchOptions::from_config(db.config()).with_sort("score", true);
    group.bench_function("sorted_by_score", |b| {
        b.iter(|| black_box(db.search_with("fox", &sorted, None).unwrap()));
    });

    let faceted = SearchOptions::from_config(db.config()).with_facet("category");
    group.bench_function("faceted_search", |b| {
        b.iter(|| black_box(db.search_with("fox", &faceted, None).unwrap()));
    });

    group.bench_function("knn_k10", |b| {
        let query = vec![0.1; 8];
        b.iter(|| black_box(db.knn("embedding", query.clone(), 10).unwrap()));
    });

    group.finish();
}

/// Benchmark merging ten segments into one
fn bench_force_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    group.sample_size(10);

    group.bench_function("force_merge_10_segments", |b| {
        b.iter_with_setup(
            || {
                let dir = TempDir::new().unwrap();
                let db = populated(&dir, 2_000, 200);
                (dir, db)
            },
            |(_dir, db)| {
                db.force_merge(1).unwrap();
            },
        );
    });
    group.finish();
}

/// Benchmark concurrent reads
fn bench_concurrent_reads(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(populated(&dir, 5_000, 1_000));
    let mut group = c.benchmark_group("concurrent");

    group.bench_function("four_readers", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let db = Arc::clone(&db);
                    thread::spawn(move || {
                        black_box(db.search(WORDS[i * 2]).unwrap());
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });
    group.finish();
}

/// Benchmark sustained indexing throughput
fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    group.sample_size(10); // Long-running
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("index_10k_records", |b| {
        b.iter_with_setup(
            || {
                let records: Vec<Value> = (1..=10_000).map(|id| create_test_record(id, 50)).collect();
                (TempDir::new().unwrap(), records)
            },
            |(dir, records)| {
                let db = open(&dir);
                for chunk in records.chunks(1_000) {
                    db.add_records(chunk).unwrap();
                }
                db.commit().unwrap();
            },
        );
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_single_insert,
    bench_batch_commit,
    bench_search,
    bench_force_merge,
    bench_concurrent_reads,
    bench_throughput,
);
criterion_main!(benches);
