use crate::compression::delta::DeltaEncoder;
use crate::compression::vbyte::{VByteEncoder, VByteReader};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;

#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: u32,       // Term frequency in document
    pub positions: Vec<u32>,  // Strictly increasing token positions
}

impl Posting {
    pub fn new(doc_id: DocId, positions: Vec<u32>) -> Self {
        Posting {
            doc_id,
            term_freq: positions.len() as u32,
            positions,
        }
    }
}

/// Posting list for a term
/// Note: Sorted by doc_id for efficient merging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingList {
    pub postings: Vec<Posting>,  // Sorted by doc_id
}

impl PostingList {
    pub fn new() -> Self {
        PostingList {
            postings: Vec::new(),
        }
    }

    pub fn add_posting(&mut self, posting: Posting) {
        // Keep sorted by doc_id; appends are the common case
        if self.postings.last().map_or(true, |last| last.doc_id < posting.doc_id) {
            self.postings.push(posting);
            return;
        }
        match self.postings.binary_search_by_key(&posting.doc_id, |p| p.doc_id) {
            Ok(pos) => self.postings[pos] = posting,
            Err(pos) => self.postings.insert(pos, posting),
        }
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn get(&self, doc_id: DocId) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|pos| &self.postings[pos])
    }

    // [count][doc ids, delta][per posting: freq, positions delta]
    pub fn encode(&self, output: &mut Vec<u8>) -> Result<()> {
        VByteEncoder::encode_u64(output, self.postings.len() as u64);
        let doc_ids: Vec<u64> = self.postings.iter().map(|p| p.doc_id.0).collect();
        DeltaEncoder::encode_u64(output, &doc_ids)?;
        for posting in &self.postings {
            if posting.term_freq as usize != posting.positions.len() {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("posting for doc {} has freq {} but {} positions",
                            posting.doc_id, posting.term_freq, posting.positions.len()),
                ));
            }
            VByteEncoder::encode_u32(output, posting.term_freq);
            DeltaEncoder::encode_u32(output, &posting.positions)?;
        }
        Ok(())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = VByteReader::new(data);
        let count = reader.read_u64()? as usize;
        if count > data.len() {
            return Err(Error::corrupted(format!("posting count {} exceeds block size", count)));
        }

        let mut doc_ids = Vec::with_capacity(count);
        let mut prev = 0u64;
        for _ in 0..count {
            let doc = prev.checked_add(reader.read_u64()?)
                .ok_or_else(|| Error::corrupted("doc id delta overflow"))?;
            doc_ids.push(doc);
            prev = doc;
        }

        let mut postings = Vec::with_capacity(count);
        for doc_id in doc_ids {
            let term_freq = reader.read_u32()?;
            let positions = DeltaEncoder::decode_u32(&mut reader, term_freq as usize)?;
            postings.push(Posting {
                doc_id: DocId(doc_id),
                term_freq,
                positions,
            });
        }

        Ok(PostingList { postings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[(u64, &[u32])]) -> PostingList {
        let mut list = PostingList::new();
        for (doc, positions) in entries {
            list.add_posting(Posting::new(DocId(*doc), positions.to_vec()));
        }
        list
    }

    #[test]
    fn test_out_of_order_inserts_stay_sorted() {
        let list = list(&[(5, &[0]), (1, &[2]), (3, &[1, 4])]);
        let ids: Vec<u64> = list.postings.iter().map(|p| p.doc_id.0).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        assert_eq!(list.get(DocId(3)).unwrap().term_freq, 2);
    }

    #[test]
    fn test_encoded_block_decodes_to_same_list() {
        let original = list(&[(2, &[0, 7, 9]), (40, &[3]), (1 << 40, &[0])]);
        let mut block = Vec::new();
        original.encode(&mut block).unwrap();

        assert_eq!(PostingList::decode(&block).unwrap(), original);
    }

    #[test]
    fn test_unsorted_positions_are_rejected() {
        let bad = PostingList {
            postings: vec![Posting::new(DocId(1), vec![4, 2])],
        };
        assert!(bad.encode(&mut Vec::new()).is_err());
    }
}
