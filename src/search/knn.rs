use std::collections::HashSet;
use std::time::Instant;
use rayon::prelude::*;
use tracing::debug;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::mvcc::controller::{SegmentView, Snapshot};
use crate::schema::schema::{FieldType, Schema};
use crate::search::context::ExecutionContext;
use crate::search::results::{ScoredDocument, SearchResults, TopKCollector};

/// Nearest-neighbour query over a vector field
#[derive(Debug, Clone, PartialEq)]
pub struct KnnQuery {
    pub field: String,
    pub vector: Vec<f32>,
    pub k: usize,
    /// Score full-precision vectors even when the field is quantized
    pub exact: bool,
}

impl KnnQuery {
    pub fn new(field: &str, vector: Vec<f32>, k: usize) -> Self {
        KnnQuery {
            field: field.to_string(),
            vector,
            k,
            exact: false,
        }
    }

    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    fn validate(&self, schema: &Schema) -> Result<()> {
        let def = schema.get_field(&self.field).ok_or_else(|| Error::unknown_field(&self.field))?;
        match def.field_type {
            FieldType::Vector { dims } if dims == self.vector.len() => Ok(()),
            FieldType::Vector { dims } => Err(Error::schema_mismatch(
                &self.field,
                format!("query vector has {} dimensions, field has {}", self.vector.len(), dims),
            )),
            _ => Err(Error::schema_mismatch(&self.field, "not a vector field")),
        }
    }
}

pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Similarity in (0, 1]; identical vectors score 1
pub fn similarity(distance_squared: f32) -> f32 {
    1.0 / (1.0 + distance_squared)
}

/// Brute-force scan of every live vector in the snapshot. Segments are
/// scanned in parallel; a segment finished before the deadline counts.
pub fn knn_search(
    snapshot: &Snapshot,
    schema: &Schema,
    query: &KnnQuery,
    ctx: &ExecutionContext,
) -> Result<SearchResults> {
    let start = Instant::now();
    query.validate(schema)?;

    let per_segment: Vec<Result<Vec<ScoredDocument>>> = snapshot
        .segments
        .par_iter()
        .map(|view| {
            ctx.check()?;
            Ok(scan_segment(view, query))
        })
        .collect();

    let mut collector = TopKCollector::new(query.k);
    let mut incomplete = false;
    let mut max_score = 0.0_f32;
    for result in per_segment {
        match result {
            Ok(docs) => {
                for doc in docs {
                    max_score = max_score.max(doc.score);
                    collector.collect(doc);
                }
            }
            Err(err) if err.kind == ErrorKind::EvaluationTimeout => incomplete = true,
            Err(err) => return Err(err),
        }
    }

    let total_hits = collector.total_collected();
    let results = SearchResults {
        hits: collector.into_sorted_vec(),
        total_hits,
        max_score,
        took_ms: start.elapsed().as_millis() as u64,
        incomplete,
        ..SearchResults::default()
    };
    debug!(field = %query.field, k = query.k, total_hits, "knn executed");
    Ok(results)
}

fn scan_segment(view: &SegmentView, query: &KnnQuery) -> Vec<ScoredDocument> {
    let Some(column) = view.reader.vector(&query.field) else {
        return Vec::new();
    };
    let quantized = match (&column.codes, query.exact) {
        (Some(codes), false) => Some((codes, codes.quantize_query(&query.vector))),
        _ => None,
    };

    view.reader
        .doc_ids()
        .iter()
        .enumerate()
        .filter(|(ordinal, id)| column.is_present(*ordinal) && !view.deleted.contains(**id))
        .filter_map(|(ordinal, _)| {
            let distance = match &quantized {
                Some((codes, encoded)) => codes.distance(encoded, ordinal)?,
                None => squared_euclidean(column.get(ordinal)?, &query.vector),
            };
            Some(ScoredDocument::new(view.reader.doc_id(ordinal), similarity(distance)))
        })
        .collect()
}

/// Fraction of the exact top-k that the (possibly quantized) search also
/// returns, over a set of query vectors. 1.0 for unquantized fields.
pub fn knn_recall(
    snapshot: &Snapshot,
    schema: &Schema,
    field: &str,
    queries: &[Vec<f32>],
    k: usize,
    ctx: &ExecutionContext,
) -> Result<f64> {
    let mut expected = 0usize;
    let mut retrieved = 0usize;
    for vector in queries {
        let approximate = KnnQuery::new(field, vector.clone(), k);
        let truth = knn_search(snapshot, schema, &approximate.clone().exact(), ctx)?;
        let found = knn_search(snapshot, schema, &approximate, ctx)?;

        let truth: HashSet<DocId> = truth.doc_ids().into_iter().collect();
        expected += truth.len();
        retrieved += found.hits.iter().filter(|h| truth.contains(&h.doc_id)).count();
    }

    let recall = if expected == 0 { 1.0 } else { retrieved as f64 / expected as f64 };
    debug!(field, queries = queries.len(), k, recall, "knn recall measured");
    Ok(recall)
}
