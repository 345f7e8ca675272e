use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use roaring::RoaringTreemap;
use tracing::{info, warn};
use crate::core::error::{Error, ErrorKind, Result};
use crate::mvcc::controller::SegmentView;
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{SegmentId, SegmentMeta};
use crate::storage::segment_writer::SegmentWriter;

pub enum MergeRequest {
    Merge { ticket: u64, views: Vec<SegmentView> },
    Shutdown,
}

pub enum MergeEvent {
    /// `merged` is `None` when every source document was deleted.
    /// `sources` carries the tombstones the merge saw, so deletes that
    /// landed meanwhile can be carried over.
    Completed {
        ticket: u64,
        merged: Option<SegmentMeta>,
        sources: Vec<(SegmentId, Arc<RoaringTreemap>)>,
    },
    Failed {
        ticket: u64,
        sources: Vec<SegmentId>,
        error: Error,
    },
}

impl MergeEvent {
    pub fn ticket(&self) -> u64 {
        match self {
            MergeEvent::Completed { ticket, .. } | MergeEvent::Failed { ticket, .. } => *ticket,
        }
    }
}

/// Background segment merger: one thread fed over a channel. Results are
/// reported back and applied by the owner of the segment set.
pub struct SegmentMerger {
    requests: Sender<MergeRequest>,
    events: Receiver<MergeEvent>,
    stash: Mutex<Vec<MergeEvent>>,
    next_ticket: AtomicU64,
    handle: Option<JoinHandle<()>>,
}

impl SegmentMerger {
    pub fn spawn(storage: Arc<StorageLayout>) -> Result<Self> {
        let (requests, request_rx) = unbounded();
        let (event_tx, events) = unbounded();

        let handle = thread::Builder::new()
            .name("segdex-merge".to_string())
            .spawn(move || merge_worker(storage, request_rx, event_tx))?;

        Ok(SegmentMerger {
            requests,
            events,
            stash: Mutex::new(Vec::new()),
            next_ticket: AtomicU64::new(1),
            handle: Some(handle),
        })
    }

    /// Queue a merge of `views`; returns its ticket
    pub fn submit(&self, views: Vec<SegmentView>) -> Result<u64> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.requests
            .send(MergeRequest::Merge { ticket, views })
            .map_err(|_| Error::new(ErrorKind::InvalidState, "merge thread has stopped".to_string()))?;
        Ok(ticket)
    }

    /// Every event reported so far, without blocking
    pub fn drain(&self) -> Vec<MergeEvent> {
        let mut out = std::mem::take(&mut *self.stash.lock());
        out.extend(self.events.try_iter());
        out
    }

    /// Block until the merge with `ticket` finishes; other events are kept
    /// for the next `drain`.
    pub fn wait_for(&self, ticket: u64) -> Result<MergeEvent> {
        {
            let mut stash = self.stash.lock();
            if let Some(pos) = stash.iter().position(|e| e.ticket() == ticket) {
                return Ok(stash.remove(pos));
            }
        }
        loop {
            let event = self
                .events
                .recv()
                .map_err(|_| Error::new(ErrorKind::InvalidState, "merge thread has stopped".to_string()))?;
            if event.ticket() == ticket {
                return Ok(event);
            }
            self.stash.lock().push(event);
        }
    }

    pub fn shutdown(&mut self) {
        let _ = self.requests.send(MergeRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("merge thread panicked");
            }
        }
    }
}

impl Drop for SegmentMerger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn merge_worker(storage: Arc<StorageLayout>, requests: Receiver<MergeRequest>, events: Sender<MergeEvent>) {
    while let Ok(request) = requests.recv() {
        let (ticket, views) = match request {
            MergeRequest::Merge { ticket, views } => (ticket, views),
            MergeRequest::Shutdown => break,
        };

        let result = merge_segments(&storage, &views);
        let sources: Vec<(SegmentId, Arc<RoaringTreemap>)> = views
            .iter()
            .map(|v| (v.reader.id(), Arc::clone(&v.deleted)))
            .collect();
        // Release the readers before reporting so retired files can go
        drop(views);

        let event = match result {
            Ok(merged) => {
                info!(
                    ticket,
                    sources = sources.len(),
                    docs = merged.as_ref().map_or(0, |m| m.doc_count),
                    "segments merged"
                );
                MergeEvent::Completed { ticket, merged, sources }
            }
            Err(error) => {
                warn!(ticket, %error, "segment merge failed");
                MergeEvent::Failed {
                    ticket,
                    sources: sources.into_iter().map(|(id, _)| id).collect(),
                    error,
                }
            }
        };

        if events.send(event).is_err() {
            break;
        }
    }
}

/// Write one segment holding the live documents of `views`
pub fn merge_segments(storage: &StorageLayout, views: &[SegmentView]) -> Result<Option<SegmentMeta>> {
    match SegmentWriter::from_segments(views)? {
        Some(writer) => writer.finish(storage).map(Some),
        None => Ok(None),
    }
}
