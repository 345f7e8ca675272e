use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tracing::debug;
use crate::analysis::analyzer::{Analyzer, AnalyzerRegistry};
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, Document, FieldValue};
use crate::index::inverted::{AnalyzedDocument, InvertedIndex, Term};
use crate::schema::document::NormalizedRecord;
use crate::schema::schema::{FieldType, Schema};

/// Position gap between values of a multi-valued text field, so phrases
/// never match across value boundaries
pub const POSITION_GAP: u32 = 100;

// Batches smaller than this are analyzed on the calling thread
const PARALLEL_THRESHOLD: usize = 64;

/// A delete recorded with its place in the write order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDelete {
    pub doc_id: DocId,
    pub seq: u64,
}

/// Everything a commit has to make durable
pub struct PendingWork {
    pub buffers: Vec<Arc<InvertedIndex>>,
    pub deletes: Vec<PendingDelete>,
}

impl PendingWork {
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.deletes.is_empty()
    }
}

/// Shared writer front end.
///
/// Any number of threads may add or delete at once. Each operation draws a
/// sequence number while holding the active buffer's read guard; freezing
/// takes the write guard, so a frozen buffer and the deletes captured with it
/// form a consistent cut of the write order.
pub struct IndexWriter {
    schema: Arc<Schema>,
    analyzers: Arc<AnalyzerRegistry>,
    default_analyzer: String,
    active: RwLock<Arc<InvertedIndex>>,
    frozen: Mutex<Vec<Arc<InvertedIndex>>>,
    deletes: Mutex<Vec<PendingDelete>>,
    seq: AtomicU64,
    next_doc_id: AtomicU64,
}

impl IndexWriter {
    pub fn new(
        schema: Arc<Schema>,
        analyzers: Arc<AnalyzerRegistry>,
        default_analyzer: &str,
        next_doc_id: u64,
    ) -> Result<Self> {
        analyzers.require(default_analyzer)?;
        for field in schema.text_fields() {
            if let Some(name) = &field.analyzer {
                analyzers.require(name)?;
            }
        }

        Ok(IndexWriter {
            schema,
            analyzers,
            default_analyzer: default_analyzer.to_string(),
            active: RwLock::new(Arc::new(InvertedIndex::new())),
            frozen: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            seq: AtomicU64::new(1),
            next_doc_id: AtomicU64::new(next_doc_id),
        })
    }

    /// Assign an id if the record has none; explicit ids push the counter past them.
    pub fn assign_id(&self, requested: Option<DocId>) -> DocId {
        match requested {
            Some(id) => {
                self.next_doc_id.fetch_max(id.0.saturating_add(1), Ordering::SeqCst);
                id
            }
            None => DocId(self.next_doc_id.fetch_add(1, Ordering::SeqCst)),
        }
    }

    pub fn next_doc_id(&self) -> u64 {
        self.next_doc_id.load(Ordering::SeqCst)
    }

    pub fn document_from_record(&self, record: NormalizedRecord) -> Document {
        Document {
            id: self.assign_id(record.id),
            fields: record.fields,
        }
    }

    /// Buffer one document; returns the active buffer size afterwards
    pub fn add_document(&self, doc: Document) -> Result<usize> {
        let analyzed = self.analyze(doc)?;
        Ok(self.append(vec![analyzed]))
    }

    /// Buffer a batch; nothing is buffered if any document fails analysis
    pub fn add_documents(&self, docs: Vec<Document>) -> Result<usize> {
        let analyzed: Vec<AnalyzedDocument> = if docs.len() >= PARALLEL_THRESHOLD {
            docs.into_par_iter()
                .map(|doc| self.analyze(doc))
                .collect::<Result<Vec<_>>>()?
        } else {
            docs.into_iter()
                .map(|doc| self.analyze(doc))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(self.append(analyzed))
    }

    fn append(&self, docs: Vec<AnalyzedDocument>) -> usize {
        let active = self.active.read();
        for doc in docs {
            let seq = self.seq.fetch_add(1, Ordering::SeqCst);
            active.add_document(doc, seq);
        }
        active.len()
    }

    pub fn delete_document(&self, doc_id: DocId) {
        let _active = self.active.read();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.deletes.lock().push(PendingDelete { doc_id, seq });
    }

    /// Documents buffered in the active segment
    pub fn buffered_docs(&self) -> usize {
        self.active.read().len()
    }

    pub fn pending_deletes(&self) -> usize {
        self.deletes.lock().len()
    }

    /// Swap out the active buffer and capture the work a commit must persist.
    /// Work stays pending until `acknowledge`, so a failed commit can be retried.
    pub fn freeze(&self) -> PendingWork {
        let mut active = self.active.write();
        let mut frozen = self.frozen.lock();
        if !active.is_empty() {
            let full = mem::replace(&mut *active, Arc::new(InvertedIndex::new()));
            debug!(docs = full.len(), terms = full.term_count(), "froze write buffer");
            frozen.push(full);
        }
        PendingWork {
            buffers: frozen.clone(),
            deletes: self.deletes.lock().clone(),
        }
    }

    /// Drop work that is now durable
    pub fn acknowledge(&self, work: &PendingWork) {
        let mut frozen = self.frozen.lock();
        let n = work.buffers.len().min(frozen.len());
        frozen.drain(..n);
        let mut deletes = self.deletes.lock();
        let n = work.deletes.len().min(deletes.len());
        deletes.drain(..n);
    }

    /// Type-check a document and turn its fields into terms
    pub fn analyze(&self, doc: Document) -> Result<AnalyzedDocument> {
        let mut terms: HashMap<Term, Vec<u32>> = HashMap::new();
        let mut lengths: HashMap<&str, u32> = HashMap::new();
        let mut next_position: HashMap<&str, u32> = HashMap::new();

        for field in &doc.fields {
            let def = self
                .schema
                .get_field(&field.name)
                .ok_or_else(|| Error::unknown_field(&field.name))?;

            match (&def.field_type, &field.value) {
                (FieldType::Text, FieldValue::Text(text)) => {
                    let analyzer = self.analyzer_for(def.analyzer.as_deref())?;
                    let base = next_position.get(def.name.as_str()).copied().unwrap_or(0);
                    let tokens = analyzer.analyze(text);
                    let mut last = None;
                    for token in &tokens {
                        let position = base + token.position;
                        terms.entry(Term::new(&def.name, &token.text)).or_default().push(position);
                        last = Some(position);
                    }
                    *lengths.entry(def.name.as_str()).or_default() += tokens.len() as u32;
                    if let Some(last) = last {
                        next_position.insert(def.name.as_str(), last + 1 + POSITION_GAP);
                    }
                }
                (FieldType::Keyword, FieldValue::Keyword(value)) => {
                    let position = next_position.get(def.name.as_str()).copied().unwrap_or(0);
                    terms.entry(Term::new(&def.name, value)).or_default().push(position);
                    next_position.insert(def.name.as_str(), position + 1);
                    *lengths.entry(def.name.as_str()).or_default() += 1;
                }
                (FieldType::Numeric, FieldValue::Number(_)) => {}
                (FieldType::Vector { dims }, FieldValue::Vector(v)) => {
                    if v.len() != *dims {
                        return Err(Error::schema_mismatch(
                            &def.name,
                            format!("expected {} dimensions, got {}", dims, v.len()),
                        ));
                    }
                }
                (expected, _) => {
                    return Err(Error::schema_mismatch(
                        &def.name,
                        format!("value does not fit field type {:?}", expected),
                    ));
                }
            }
        }

        let field_lengths = lengths
            .into_iter()
            .map(|(name, len)| (name.to_string(), len))
            .collect();

        Ok(AnalyzedDocument {
            terms: terms.into_iter().collect(),
            field_lengths,
            document: doc,
        })
    }

    fn analyzer_for(&self, name: Option<&str>) -> Result<Arc<Analyzer>> {
        self.analyzers.require(name.unwrap_or(&self.default_analyzer))
    }
}
