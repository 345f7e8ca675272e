use crate::mvcc::controller::SegmentView;

/// Policy for deciding when and how to merge segments
pub trait MergePolicy: Send + Sync {
    /// Indices into `segments` of one merge to run, or empty
    fn select_segments_to_merge(&self, segments: &[SegmentView]) -> Vec<usize>;
}

/// Log-structured merge policy: segments are bucketed by live document
/// count in powers of `merge_factor`; a full bucket is merged.
pub struct LogStructuredMergePolicy {
    pub merge_factor: usize,
    pub max_merge_docs: u64,   // larger segments are left alone
}

impl LogStructuredMergePolicy {
    pub fn new(merge_factor: usize, max_merge_docs: u64) -> Self {
        LogStructuredMergePolicy {
            merge_factor: merge_factor.max(2),
            max_merge_docs,
        }
    }

    fn tier(&self, live_docs: u64) -> usize {
        let factor = self.merge_factor as f64;
        ((live_docs.max(1) as f64).ln() / factor.ln()) as usize
    }
}

impl MergePolicy for LogStructuredMergePolicy {
    fn select_segments_to_merge(&self, segments: &[SegmentView]) -> Vec<usize> {
        let mut tiers: Vec<Vec<usize>> = Vec::new();

        for (i, segment) in segments.iter().enumerate() {
            let live = segment.live_count();
            if live > self.max_merge_docs {
                continue;
            }
            let tier_index = self.tier(live);
            while tiers.len() <= tier_index {
                tiers.push(Vec::new());
            }
            tiers[tier_index].push(i);
        }

        // Smallest tier first
        for tier in tiers {
            if tier.len() >= self.merge_factor {
                return tier.into_iter().take(self.merge_factor).collect();
            }
        }

        // Segments that are mostly tombstones are rewritten on their own
        let mostly_deleted: Vec<usize> = segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.deleted.len() * 2 > s.reader.doc_count() as u64)
            .map(|(i, _)| i)
            .collect();
        if !mostly_deleted.is_empty() {
            return mostly_deleted;
        }

        Vec::new()
    }
}

/// Selection for an explicit merge down to `max_segments`
pub struct ForceMergePolicy {
    pub max_segments: usize,
}

impl MergePolicy for ForceMergePolicy {
    fn select_segments_to_merge(&self, segments: &[SegmentView]) -> Vec<usize> {
        let max_segments = self.max_segments.max(1);
        let has_deletes = segments.iter().any(|s| !s.deleted.is_empty());

        if segments.len() <= max_segments {
            // A single segment carrying tombstones is still rewritten
            if max_segments == 1 && segments.len() == 1 && has_deletes {
                return vec![0];
            }
            return Vec::new();
        }

        // Merge the smallest segments together
        let mut by_size: Vec<usize> = (0..segments.len()).collect();
        by_size.sort_by_key(|i| segments[*i].live_count());
        let take = segments.len() - max_segments + 1;
        let mut selected: Vec<usize> = by_size.into_iter().take(take).collect();
        selected.sort_unstable();
        selected
    }
}
