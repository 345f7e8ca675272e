use std::collections::HashMap;
use std::fs::{self, File};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use lru::LruCache;
use memmap2::{Mmap, MmapOptions};
use parking_lot::Mutex;
use tracing::{debug, warn};
use fst::{IntoStreamer, Streamer};
use crate::compression::compress::CompressedBlock;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, Document};
use crate::index::inverted::Term;
use crate::index::posting::PostingList;
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{
    FieldLengths, NumericColumn, Section, SegmentBody, SegmentHeader, SegmentId, SegmentMeta,
    VectorColumn,
};

/// A byte range of a mapped segment file, shareable with the fst dictionary
#[derive(Clone)]
pub struct SegmentBytes {
    mmap: Arc<Mmap>,
    start: usize,
    end: usize,
}

impl AsRef<[u8]> for SegmentBytes {
    fn as_ref(&self) -> &[u8] {
        &self.mmap[self.start..self.end]
    }
}

/// Read-only view over one sealed segment file.
///
/// Term dictionary and postings are read straight from the mapping; doc ids,
/// field lengths and columns are decoded once at open.
pub struct SegmentReader {
    meta: SegmentMeta,
    path: PathBuf,
    mmap: Arc<Mmap>,
    terms: fst::Map<SegmentBytes>,
    postings: Section,
    body: SegmentBody,
    lengths_by_field: HashMap<String, usize>,
    numeric_by_field: HashMap<String, usize>,
    vectors_by_field: HashMap<String, usize>,
    doc_cache: Option<Mutex<LruCache<usize, Arc<Document>>>>,
    obsolete: AtomicBool,
}

impl SegmentReader {
    pub fn open(storage: &StorageLayout, id: SegmentId, doc_cache_size: usize) -> Result<Self> {
        let path = storage.segment_path(&id);
        let file = File::open(&path).map_err(|err| {
            Error::corrupted(format!("segment {} unreadable: {}", id, err))
        })?;
        let len = file.metadata()?.len() as usize;
        if len < SegmentHeader::SIZE {
            return Err(Error::corrupted(format!("segment {} is truncated", id)));
        }
        let mmap = Arc::new(unsafe { MmapOptions::new().len(len).map(&file)? });

        let header = SegmentHeader::decode(&mmap)?;
        let checksum = crc32fast::hash(&mmap[SegmentHeader::SIZE..]);
        if checksum != header.checksum {
            return Err(Error::corrupted(format!(
                "segment {} checksum mismatch: expected {:08x}, found {:08x}",
                id, header.checksum, checksum
            )));
        }

        let body: SegmentBody = bincode::deserialize(slice(&mmap, header.body))
            .map_err(|err| Error::corrupted(format!("segment {} body: {}", id, err)))?;
        if body.meta.id != id {
            return Err(Error::corrupted(format!("segment file {} claims id {}", id, body.meta.id)));
        }
        if body.doc_ids.len() != body.meta.doc_count as usize || body.stored.len() != body.doc_ids.len() {
            return Err(Error::corrupted(format!("segment {} document tables disagree", id)));
        }

        let terms = fst::Map::new(SegmentBytes {
            mmap: Arc::clone(&mmap),
            start: header.dict.offset as usize,
            end: header.dict.end() as usize,
        })
        .map_err(|err| Error::corrupted(format!("segment {} term dictionary: {}", id, err)))?;

        let index_of = |names: Vec<&String>| -> HashMap<String, usize> {
            names.into_iter().enumerate().map(|(i, n)| (n.clone(), i)).collect()
        };
        let lengths_by_field = index_of(body.field_lengths.iter().map(|f| &f.field).collect());
        let numeric_by_field = index_of(body.numeric.iter().map(|c| &c.field).collect());
        let vectors_by_field = index_of(body.vectors.iter().map(|c| &c.field).collect());

        let doc_cache = NonZeroUsize::new(doc_cache_size).map(|cap| Mutex::new(LruCache::new(cap)));

        debug!(segment = %id, docs = body.meta.doc_count, terms = body.meta.term_count, "opened segment");

        Ok(SegmentReader {
            meta: body.meta.clone(),
            path,
            mmap,
            terms,
            postings: header.postings,
            body,
            lengths_by_field,
            numeric_by_field,
            vectors_by_field,
            doc_cache,
            obsolete: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> SegmentId {
        self.meta.id
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn doc_count(&self) -> usize {
        self.body.doc_ids.len()
    }

    pub fn doc_ids(&self) -> &[u64] {
        &self.body.doc_ids
    }

    pub fn doc_id(&self, ordinal: usize) -> DocId {
        DocId(self.body.doc_ids[ordinal])
    }

    pub fn ordinal(&self, doc_id: DocId) -> Option<usize> {
        self.body.doc_ids.binary_search(&doc_id.0).ok()
    }

    pub fn term_dict(&self) -> &fst::Map<SegmentBytes> {
        &self.terms
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn postings(&self, term: &Term) -> Result<Option<PostingList>> {
        match self.terms.get(term.as_bytes()) {
            Some(offset) => Ok(Some(self.postings_at(offset)?)),
            None => Ok(None),
        }
    }

    /// Decode the posting list stored at a dictionary offset
    pub fn postings_at(&self, offset: u64) -> Result<PostingList> {
        PostingList::decode(self.postings_block(offset)?)
    }

    fn postings_block(&self, offset: u64) -> Result<&[u8]> {
        if offset >= self.postings.len {
            return Err(Error::corrupted(format!(
                "segment {}: postings offset {} out of range", self.meta.id, offset
            )));
        }
        let start = (self.postings.offset + offset) as usize;
        Ok(&self.mmap[start..self.postings.end() as usize])
    }

    /// Values of a keyword field per ordinal, recovered from the term
    /// dictionary. Multi-valued entries come back in term order.
    pub fn keyword_values(&self, field: &str) -> Result<Vec<Vec<String>>> {
        let mut lower = field.as_bytes().to_vec();
        lower.push(0);
        let mut upper = field.as_bytes().to_vec();
        upper.push(1);

        let mut values: Vec<Vec<String>> = vec![Vec::new(); self.doc_count()];
        let mut stream = self.terms.range().ge(&lower).lt(&upper).into_stream();
        while let Some((key, offset)) = stream.next() {
            let text = String::from_utf8_lossy(&key[lower.len()..]).into_owned();
            for posting in self.postings_at(offset)?.postings {
                if let Some(ordinal) = self.ordinal(posting.doc_id) {
                    values[ordinal].push(text.clone());
                }
            }
        }
        Ok(values)
    }

    pub fn field_lengths(&self) -> &[FieldLengths] {
        &self.body.field_lengths
    }

    pub fn field_length(&self, field: &str, ordinal: usize) -> u32 {
        self.lengths_by_field
            .get(field)
            .and_then(|i| self.body.field_lengths[*i].lengths.get(ordinal))
            .copied()
            .unwrap_or(0)
    }

    pub fn field_total_length(&self, field: &str) -> u64 {
        self.lengths_by_field
            .get(field)
            .map_or(0, |i| self.body.field_lengths[*i].total)
    }

    pub fn numeric_columns(&self) -> &[NumericColumn] {
        &self.body.numeric
    }

    pub fn numeric(&self, field: &str) -> Option<&NumericColumn> {
        self.numeric_by_field.get(field).map(|i| &self.body.numeric[*i])
    }

    pub fn vector_columns(&self) -> &[VectorColumn] {
        &self.body.vectors
    }

    pub fn vector(&self, field: &str) -> Option<&VectorColumn> {
        self.vectors_by_field.get(field).map(|i| &self.body.vectors[*i])
    }

    /// Compressed stored document
    pub fn stored_bytes(&self, ordinal: usize) -> Result<&[u8]> {
        self.body.stored.get(ordinal).map(Vec::as_slice).ok_or_else(|| Error {
            kind: ErrorKind::NotFound,
            context: format!("segment {} has no ordinal {}", self.meta.id, ordinal),
        })
    }

    pub fn document(&self, ordinal: usize) -> Result<Arc<Document>> {
        if let Some(cache) = &self.doc_cache {
            if let Some(doc) = cache.lock().get(&ordinal) {
                return Ok(Arc::clone(doc));
            }
        }

        let raw = CompressedBlock::decompress(self.stored_bytes(ordinal)?)?;
        let doc: Document = bincode::deserialize(&raw)
            .map_err(|err| Error::corrupted(format!("segment {} document {}: {}", self.meta.id, ordinal, err)))?;
        let doc = Arc::new(doc);

        if let Some(cache) = &self.doc_cache {
            cache.lock().put(ordinal, Arc::clone(&doc));
        }
        Ok(doc)
    }

    /// Delete the file once the last reader lets go
    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }
}

impl Drop for SegmentReader {
    fn drop(&mut self) {
        if self.obsolete.load(Ordering::Acquire) {
            match fs::remove_file(&self.path) {
                Ok(()) => debug!(segment = %self.meta.id, "removed obsolete segment"),
                Err(err) => warn!(segment = %self.meta.id, error = %err, "failed to remove obsolete segment"),
            }
        }
    }
}

fn slice(mmap: &Mmap, section: Section) -> &[u8] {
    &mmap[section.offset as usize..section.end() as usize]
}
