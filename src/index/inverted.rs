use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::{Mutex, MutexGuard, RwLock};
use crate::core::types::{DocId, Document};

/// Term representation: field name and term text separated by a NUL byte.
/// Byte order keeps every term of a field contiguous in the dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Term(Vec<u8>);

impl Term {
    pub fn new(field: &str, text: &str) -> Self {
        let mut bytes = Vec::with_capacity(field.len() + 1 + text.len());
        bytes.extend_from_slice(field.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(text.as_bytes());
        Term(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Term(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// (field, text), or None for bytes not produced by `Term::new`
    pub fn split(&self) -> Option<(&str, &str)> {
        let sep = self.0.iter().position(|b| *b == 0)?;
        let field = std::str::from_utf8(&self.0[..sep]).ok()?;
        let text = std::str::from_utf8(&self.0[sep + 1..]).ok()?;
        Some((field, text))
    }

    pub fn field(&self) -> Option<&str> {
        self.split().map(|(field, _)| field)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.split() {
            Some((field, text)) => write!(f, "{}:{}", field, text),
            None => write!(f, "{}", String::from_utf8_lossy(&self.0)),
        }
    }
}

/// Output of analysis for one document, ready to be buffered
#[derive(Debug, Clone)]
pub struct AnalyzedDocument {
    pub document: Document,
    pub terms: Vec<(Term, Vec<u32>)>,        // positions strictly increasing
    pub field_lengths: Vec<(String, u32)>,   // tokens per indexed field
}

/// A buffered document together with the write order that produced it
#[derive(Debug, Clone)]
pub struct BufferedDoc {
    pub document: Document,
    pub seq: u64,
    pub field_lengths: Vec<(String, u32)>,
}

impl BufferedDoc {
    pub fn doc_id(&self) -> DocId {
        self.document.id
    }

    pub fn field_length(&self, field: &str) -> u32 {
        self.field_lengths
            .iter()
            .find(|(name, _)| name == field)
            .map_or(0, |(_, len)| *len)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferedPosting {
    pub ordinal: u32,          // slot in the buffer's document list
    pub positions: Vec<u32>,
}

impl BufferedPosting {
    pub fn term_freq(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// Inverted index for the active, in-memory segment.
///
/// Writers share it concurrently: documents are appended to an ordinal-indexed
/// list and each term keeps its own lock, so unrelated terms never contend.
/// Nothing is removed in place; superseded documents are dropped when the
/// buffer is sealed into an immutable segment.
pub struct InvertedIndex {
    docs: Mutex<Vec<BufferedDoc>>,
    postings: RwLock<HashMap<Term, Mutex<Vec<BufferedPosting>>>>,
    total_tokens: AtomicU64,
}

impl InvertedIndex {
    pub fn new() -> Self {
        InvertedIndex {
            docs: Mutex::new(Vec::new()),
            postings: RwLock::new(HashMap::new()),
            total_tokens: AtomicU64::new(0),
        }
    }

    /// Append one analyzed document; returns its ordinal.
    pub fn add_document(&self, analyzed: AnalyzedDocument, seq: u64) -> u32 {
        let AnalyzedDocument { document, terms, field_lengths } = analyzed;
        let tokens: u64 = field_lengths.iter().map(|(_, len)| *len as u64).sum();

        let ordinal = {
            let mut docs = self.docs.lock();
            docs.push(BufferedDoc {
                document,
                seq,
                field_lengths,
            });
            (docs.len() - 1) as u32
        };

        let mut missing = Vec::new();
        {
            let postings = self.postings.read();
            for (term, positions) in terms {
                match postings.get(&term) {
                    Some(list) => insert_sorted(&mut list.lock(), BufferedPosting { ordinal, positions }),
                    None => missing.push((term, positions)),
                }
            }
        }

        // New terms need the map's write lock
        if !missing.is_empty() {
            let mut postings = self.postings.write();
            for (term, positions) in missing {
                let list = postings.entry(term).or_insert_with(|| Mutex::new(Vec::new()));
                insert_sorted(list.get_mut(), BufferedPosting { ordinal, positions });
            }
        }

        self.total_tokens.fetch_add(tokens, Ordering::Relaxed);
        ordinal
    }

    /// Documents appended so far, including superseded ones
    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn term_count(&self) -> usize {
        self.postings.read().len()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens.load(Ordering::Relaxed)
    }

    pub fn documents(&self) -> MutexGuard<'_, Vec<BufferedDoc>> {
        self.docs.lock()
    }

    /// Terms in dictionary (byte) order
    pub fn sorted_terms(&self) -> Vec<Term> {
        let mut terms: Vec<Term> = self.postings.read().keys().cloned().collect();
        terms.sort_unstable();
        terms
    }

    pub fn postings(&self, term: &Term) -> Option<Vec<BufferedPosting>> {
        self.postings.read().get(term).map(|list| list.lock().clone())
    }
}

impl Default for InvertedIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_sorted(list: &mut Vec<BufferedPosting>, posting: BufferedPosting) {
    if list.last().map_or(true, |last| last.ordinal < posting.ordinal) {
        list.push(posting);
        return;
    }
    let pos = list.partition_point(|p| p.ordinal < posting.ordinal);
    list.insert(pos, posting);
}
