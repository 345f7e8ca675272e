use serde::{Deserialize, Serialize};
use crate::columnar::cache::CacheStats;

/// Index statistics for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub generation: u64,

    // Committed state
    pub segment_count: usize,
    pub doc_count: u64,
    pub deleted_count: u64,   // tombstoned but not yet merged away
    pub term_count: u64,      // summed over segments
    pub size_bytes: u64,

    // Not yet committed
    pub buffered_docs: usize,
    pub pending_deletes: usize,

    pub merges_in_flight: usize,
    pub columnar: Option<CacheStats>,
}

impl IndexStats {
    /// Share of committed documents that are tombstones
    pub fn deleted_ratio(&self) -> f64 {
        let total = self.doc_count + self.deleted_count;
        if total == 0 {
            0.0
        } else {
            self.deleted_count as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deleted_ratio() {
        let mut stats = IndexStats {
            generation: 1,
            segment_count: 1,
            doc_count: 3,
            deleted_count: 1,
            term_count: 10,
            size_bytes: 100,
            buffered_docs: 0,
            pending_deletes: 0,
            merges_in_flight: 0,
            columnar: None,
        };
        assert_eq!(stats.deleted_ratio(), 0.25);

        stats.doc_count = 0;
        stats.deleted_count = 0;
        assert_eq!(stats.deleted_ratio(), 0.0);
    }
}
