use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use roaring::RoaringTreemap;
use crate::core::error::Result;
use crate::core::types::{DocId, Document};
use crate::storage::segment_reader::SegmentReader;

/// A sealed segment together with the deletions visible in one generation
#[derive(Clone)]
pub struct SegmentView {
    pub reader: Arc<SegmentReader>,
    pub deleted: Arc<RoaringTreemap>,
}

impl SegmentView {
    pub fn new(reader: Arc<SegmentReader>) -> Self {
        SegmentView {
            reader,
            deleted: Arc::new(RoaringTreemap::new()),
        }
    }

    pub fn is_live(&self, doc_id: DocId) -> bool {
        !self.deleted.contains(doc_id.0)
    }

    pub fn live_count(&self) -> u64 {
        (self.reader.doc_count() as u64).saturating_sub(self.deleted.len())
    }

    /// Ordinal of a live document
    pub fn live_ordinal(&self, doc_id: DocId) -> Option<usize> {
        if !self.reader.meta().may_contain(doc_id) || !self.is_live(doc_id) {
            return None;
        }
        self.reader.ordinal(doc_id)
    }
}

/// Snapshot of index at a point in time
#[derive(Clone)]
pub struct Snapshot {
    pub generation: u64,
    pub segments: Vec<SegmentView>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Snapshot {
            generation: 0,
            segments: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn new(generation: u64, segments: Vec<SegmentView>) -> Self {
        Snapshot {
            generation,
            segments,
            timestamp: Utc::now(),
        }
    }

    pub fn doc_count(&self) -> u64 {
        self.segments.iter().map(SegmentView::live_count).sum()
    }

    pub fn deleted_count(&self) -> u64 {
        self.segments.iter().map(|s| s.deleted.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count() == 0
    }

    /// (segment index, ordinal) of the live copy of a document
    pub fn locate(&self, doc_id: DocId) -> Option<(usize, usize)> {
        self.segments
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, view)| view.live_ordinal(doc_id).map(|ord| (i, ord)))
    }

    pub fn get_document(&self, doc_id: DocId) -> Result<Option<Arc<Document>>> {
        match self.locate(doc_id) {
            Some((seg, ordinal)) => Ok(Some(self.segments[seg].reader.document(ordinal)?)),
            None => Ok(None),
        }
    }
}

/// Publishes immutable snapshots; readers never block writers
pub struct MVCCController {
    current: RwLock<Arc<Snapshot>>,
}

impl MVCCController {
    pub fn new(initial: Snapshot) -> Self {
        MVCCController {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = Arc::clone(&snapshot);
        snapshot
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_published_snapshot_replaces_current() {
        let controller = MVCCController::new(Snapshot::empty());
        let before = controller.current_snapshot();
        assert_eq!(before.generation, 0);
        assert!(before.is_empty());

        controller.publish(Snapshot::new(3, Vec::new()));
        assert_eq!(controller.generation(), 3);
        // Old readers keep their view
        assert_eq!(before.generation, 0);
        assert_eq!(before.locate(DocId(1)), None);
    }
}
