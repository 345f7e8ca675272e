use crate::core::error::{Error, ErrorKind, Result};

/// LZ4 block with the uncompressed length prepended
pub struct CompressedBlock;

impl CompressedBlock {
    pub fn compress(data: &[u8]) -> Vec<u8> {
        lz4_flex::compress_prepend_size(data)
    }

    pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::new(ErrorKind::Corrupted, format!("LZ4 block: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_corrupted() {
        let err = CompressedBlock::decompress(&[16, 0, 0, 0, 0xf0]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Corrupted);
    }
}
