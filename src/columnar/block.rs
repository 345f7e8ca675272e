use std::collections::HashMap;
use crate::core::types::DocId;

/// Documents per block
pub const BLOCK_SIZE: usize = 1024;
const WORDS: usize = BLOCK_SIZE / 64;

/// What the cache knows about one document's value
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<'a, T> {
    /// Mirrored, with a value
    Value(&'a [T]),
    /// Mirrored, field absent
    Empty,
    /// Not mirrored; read the document store
    Miss,
}

/// Fixed-width slots for `BLOCK_SIZE` consecutive doc ids
struct Block<T> {
    values: Vec<T>,
    known: [u64; WORDS],
    present: [u64; WORDS],
}

impl<T: Copy + Default> Block<T> {
    fn new(width: usize) -> Self {
        Block {
            values: vec![T::default(); width * BLOCK_SIZE],
            known: [0; WORDS],
            present: [0; WORDS],
        }
    }

    fn is_unused(&self) -> bool {
        self.known.iter().all(|w| *w == 0)
    }
}

fn bit(slot: usize) -> (usize, u64) {
    (slot / 64, 1u64 << (slot % 64))
}

/// One column: `width` values of `T` per document, addressed by doc id
pub struct BlockColumn<T> {
    width: usize,
    blocks: HashMap<u64, Block<T>>,
}

impl<T: Copy + Default> BlockColumn<T> {
    pub fn new(width: usize) -> Self {
        BlockColumn {
            width: width.max(1),
            blocks: HashMap::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn locate(doc: DocId) -> (u64, usize) {
        (doc.0 / BLOCK_SIZE as u64, (doc.0 % BLOCK_SIZE as u64) as usize)
    }

    /// Record a document's value; `None` records a known absence.
    /// Values of the wrong width are ignored.
    pub fn set(&mut self, doc: DocId, value: Option<&[T]>) {
        if matches!(value, Some(v) if v.len() != self.width) {
            return;
        }
        let (block_id, slot) = Self::locate(doc);
        let width = self.width;
        let block = self.blocks.entry(block_id).or_insert_with(|| Block::new(width));
        let (word, mask) = bit(slot);
        block.known[word] |= mask;
        match value {
            Some(v) => {
                block.values[slot * width..(slot + 1) * width].copy_from_slice(v);
                block.present[word] |= mask;
            }
            None => block.present[word] &= !mask,
        }
    }

    /// Stop mirroring a document
    pub fn forget(&mut self, doc: DocId) {
        let (block_id, slot) = Self::locate(doc);
        let Some(block) = self.blocks.get_mut(&block_id) else { return };
        let (word, mask) = bit(slot);
        block.known[word] &= !mask;
        block.present[word] &= !mask;
        if block.is_unused() {
            self.blocks.remove(&block_id);
        }
    }

    pub fn get(&self, doc: DocId) -> Slot<'_, T> {
        let (block_id, slot) = Self::locate(doc);
        let Some(block) = self.blocks.get(&block_id) else { return Slot::Miss };
        let (word, mask) = bit(slot);
        if block.known[word] & mask == 0 {
            Slot::Miss
        } else if block.present[word] & mask == 0 {
            Slot::Empty
        } else {
            Slot::Value(&block.values[slot * self.width..(slot + 1) * self.width])
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn memory_bytes(&self) -> usize {
        self.blocks.len() * (self.width * BLOCK_SIZE * std::mem::size_of::<T>() + WORDS * 16)
    }
}
