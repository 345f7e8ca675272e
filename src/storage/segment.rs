use std::fmt;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use serde::{Deserialize, Serialize};
use crate::compression::quantize::{Quantization, QuantizedVectors};
use crate::core::error::{Error, Result};
use crate::core::types::DocId;

/// Unique segment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    pub fn new() -> Self {
        SegmentId(Uuid::new_v4())
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: SegmentId,
    pub doc_count: u32,
    pub term_count: u64,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub min_doc_id: DocId,
    pub max_doc_id: DocId,
}

impl SegmentMeta {
    /// Cheap pre-check before a binary search over doc ids
    pub fn may_contain(&self, id: DocId) -> bool {
        self.doc_count > 0 && id >= self.min_doc_id && id <= self.max_doc_id
    }
}

/// Segment file header
//
// [ magic | version | checksum | reserved ]  16 bytes
// [ dict offset, len | postings offset, len | body offset, len ]  48 bytes
// [ term dictionary (fst) ][ postings ][ body (bincode) ]
//
// The checksum covers everything after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub version: u32,
    pub checksum: u32,
    pub dict: Section,
    pub postings: Section,
    pub body: Section,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Section {
    pub offset: u64,
    pub len: u64,
}

impl Section {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

impl SegmentHeader {
    pub const MAGIC: &'static [u8; 4] = b"SGDX";
    pub const VERSION: u32 = 1;
    pub const SIZE: usize = 64; // Fixed header size

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(Self::MAGIC);
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        let sections = [self.dict, self.postings, self.body];
        for (i, section) in sections.iter().enumerate() {
            let base = 16 + i * 16;
            out[base..base + 8].copy_from_slice(&section.offset.to_le_bytes());
            out[base + 8..base + 16].copy_from_slice(&section.len.to_le_bytes());
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::corrupted("segment shorter than its header"));
        }
        if &data[0..4] != Self::MAGIC {
            return Err(Error::corrupted("bad segment magic"));
        }
        let version = read_u32(&data[4..8]);
        if version != Self::VERSION {
            return Err(Error::corrupted(format!("unsupported segment version {}", version)));
        }

        let section = |i: usize| {
            let base = 16 + i * 16;
            Section {
                offset: read_u64(&data[base..base + 8]),
                len: read_u64(&data[base + 8..base + 16]),
            }
        };

        let header = SegmentHeader {
            version,
            checksum: read_u32(&data[8..12]),
            dict: section(0),
            postings: section(1),
            body: section(2),
        };

        let file_len = data.len() as u64;
        let mut expected = Self::SIZE as u64;
        for s in [header.dict, header.postings, header.body] {
            if s.offset != expected || s.end() > file_len {
                return Err(Error::corrupted("segment section table is inconsistent"));
            }
            expected = s.end();
        }
        if expected != file_len {
            return Err(Error::corrupted("segment has trailing or missing bytes"));
        }

        Ok(header)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Tokens per document for one indexed field, by ordinal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldLengths {
    pub field: String,
    pub lengths: Vec<u32>,
    pub total: u64,
}

/// Multi-valued numbers: values of ordinal `i` are `values[offsets[i]..offsets[i + 1]]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub field: String,
    pub offsets: Vec<u32>,
    pub values: Vec<f64>,
}

impl NumericColumn {
    pub fn get(&self, ordinal: usize) -> &[f64] {
        match (self.offsets.get(ordinal), self.offsets.get(ordinal + 1)) {
            (Some(start), Some(end)) => &self.values[*start as usize..*end as usize],
            _ => &[],
        }
    }
}

/// Fixed-width vectors; absent slots are zero-filled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorColumn {
    pub field: String,
    pub dims: u32,
    pub present: Vec<bool>,
    pub values: Vec<f32>,
    pub quantization: Option<Quantization>,
    pub codes: Option<QuantizedVectors>,   // filled when the segment is sealed
}

impl VectorColumn {
    pub fn get(&self, ordinal: usize) -> Option<&[f32]> {
        if !self.present.get(ordinal).copied().unwrap_or(false) {
            return None;
        }
        let dims = self.dims as usize;
        self.values.get(ordinal * dims..(ordinal + 1) * dims)
    }

    pub fn is_present(&self, ordinal: usize) -> bool {
        self.present.get(ordinal).copied().unwrap_or(false)
    }

    /// Encode every slot with the column's quantization, if it has one
    pub fn quantize(&mut self) {
        self.codes = self
            .quantization
            .map(|q| QuantizedVectors::encode(q, self.dims as usize, &self.values));
    }
}

/// Everything besides the term dictionary and postings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentBody {
    pub meta: SegmentMeta,
    pub doc_ids: Vec<u64>,             // ascending; index = ordinal
    pub field_lengths: Vec<FieldLengths>,
    pub numeric: Vec<NumericColumn>,
    pub vectors: Vec<VectorColumn>,
    pub stored: Vec<Vec<u8>>,          // lz4 compressed bincode documents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(dict: u64, postings: u64, body: u64) -> SegmentHeader {
        let base = SegmentHeader::SIZE as u64;
        SegmentHeader {
            version: SegmentHeader::VERSION,
            checksum: 0xdead_beef,
            dict: Section { offset: base, len: dict },
            postings: Section { offset: base + dict, len: postings },
            body: Section { offset: base + dict + postings, len: body },
        }
    }

    #[test]
    fn test_header_layout() {
        let h = header(10, 20, 30);
        let mut file = h.encode().to_vec();
        file.resize(SegmentHeader::SIZE + 60, 0);
        assert_eq!(&file[0..4], b"SGDX");
        assert_eq!(SegmentHeader::decode(&file).unwrap(), h);
    }

    #[test]
    fn test_truncated_file_is_corrupted() {
        let h = header(10, 20, 30);
        let mut file = h.encode().to_vec();
        file.resize(SegmentHeader::SIZE + 59, 0);
        let err = SegmentHeader::decode(&file).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Corrupted);

        let mut bad_magic = h.encode().to_vec();
        bad_magic[0] = b'X';
        assert!(SegmentHeader::decode(&bad_magic).is_err());
    }

    #[test]
    fn test_numeric_column_slices() {
        let column = NumericColumn {
            field: "price".into(),
            offsets: vec![0, 2, 2, 3],
            values: vec![1.0, 2.0, 5.0],
        };
        assert_eq!(column.get(0), &[1.0, 2.0]);
        assert!(column.get(1).is_empty());
        assert_eq!(column.get(2), &[5.0]);
        assert!(column.get(3).is_empty());
    }
}
