use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use serde::{Deserialize, Serialize};
use crate::core::types::DocId;

/// Search results container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<ScoredDocument>,
    pub total_hits: usize,
    pub max_score: f32,
    pub took_ms: u64,
    /// Some segments were skipped because the deadline passed
    pub incomplete: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub facets: BTreeMap<String, Vec<FacetCount>>,
}

impl SearchResults {
    pub fn doc_ids(&self) -> Vec<DocId> {
        self.hits.iter().map(|h| h.doc_id).collect()
    }
}

/// Document with relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub doc_id: DocId,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<serde_json::Value>,  // Optionally include full document
}

impl ScoredDocument {
    pub fn new(doc_id: DocId, score: f32) -> Self {
        ScoredDocument {
            doc_id,
            score,
            sort_value: None,
            document: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCount {
    pub value: String,
    pub count: u64,
}

/// Result order: higher score first, then lower doc id
pub fn rank_cmp(a: &ScoredDocument, b: &ScoredDocument) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id))
}

// Heap entry whose maximum is the worst-ranked hit
struct Ranked(ScoredDocument);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        rank_cmp(&self.0, &other.0)
    }
}

/// Top-K collector for efficient result collection
pub struct TopKCollector {
    heap: BinaryHeap<Ranked>,
    k: usize,
    total_collected: usize,  // Track total documents processed
}

impl TopKCollector {
    pub fn new(k: usize) -> Self {
        TopKCollector {
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
            k,
            total_collected: 0,
        }
    }

    pub fn collect(&mut self, scored_doc: ScoredDocument) {
        self.total_collected += 1;
        if self.k == 0 {
            return;
        }

        if self.heap.len() < self.k {
            self.heap.push(Ranked(scored_doc));
            return;
        }

        // Replace the current worst only if the new hit ranks before it
        if let Some(worst) = self.heap.peek() {
            if rank_cmp(&scored_doc, &worst.0) == Ordering::Less {
                self.heap.pop();
                self.heap.push(Ranked(scored_doc));
            }
        }
    }

    pub fn total_collected(&self) -> usize {
        self.total_collected
    }

    pub fn into_sorted_vec(self) -> Vec<ScoredDocument> {
        let mut results: Vec<ScoredDocument> = self.heap.into_iter().map(|r| r.0).collect();
        results.sort_by(rank_cmp);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_best_k_with_id_tiebreak() {
        let mut collector = TopKCollector::new(3);
        for (id, score) in [(5, 1.0), (1, 2.0), (3, 1.0), (2, 1.0), (9, 0.5), (4, 3.0)] {
            collector.collect(ScoredDocument::new(DocId(id), score));
        }
        assert_eq!(collector.total_collected(), 6);

        let ids: Vec<u64> = collector.into_sorted_vec().iter().map(|d| d.doc_id.0).collect();
        assert_eq!(ids, vec![4, 1, 2]);
    }

    #[test]
    fn test_zero_k_only_counts() {
        let mut collector = TopKCollector::new(0);
        collector.collect(ScoredDocument::new(DocId(1), 1.0));
        assert_eq!(collector.total_collected(), 1);
        assert!(collector.into_sorted_vec().is_empty());
    }

    #[test]
    fn test_results_serialize_without_empty_parts() {
        let results = SearchResults {
            hits: vec![ScoredDocument::new(DocId(7), 1.5)],
            total_hits: 1,
            max_score: 1.5,
            ..SearchResults::default()
        };
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["hits"][0]["doc_id"], 7);
        assert!(json.get("facets").is_none());
        assert!(json["hits"][0].get("document").is_none());
    }
}
