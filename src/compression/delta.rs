use crate::compression::vbyte::{VByteEncoder, VByteReader};
use crate::core::error::{Error, ErrorKind, Result};

/// Delta encoding for strictly increasing integers
pub struct DeltaEncoder;

impl DeltaEncoder {
    /// First value is written as-is, every following value as the gap to its predecessor.
    pub fn encode_u64(output: &mut Vec<u8>, values: &[u64]) -> Result<()> {
        let mut prev = 0u64;
        for (i, &value) in values.iter().enumerate() {
            if i > 0 && value <= prev {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("delta input not strictly increasing at index {}", i),
                ));
            }
            VByteEncoder::encode_u64(output, value - prev);
            prev = value;
        }
        Ok(())
    }

    pub fn encode_u32(output: &mut Vec<u8>, values: &[u32]) -> Result<()> {
        let mut prev = 0u32;
        for (i, &value) in values.iter().enumerate() {
            if i > 0 && value <= prev {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("delta input not strictly increasing at index {}", i),
                ));
            }
            VByteEncoder::encode_u32(output, value - prev);
            prev = value;
        }
        Ok(())
    }

    pub fn decode_u32(reader: &mut VByteReader<'_>, count: usize) -> Result<Vec<u32>> {
        let mut values = Vec::with_capacity(count);
        let mut prev = 0u32;
        for _ in 0..count {
            let delta = reader.read_u32()?;
            let value = prev.checked_add(delta)
                .ok_or_else(|| Error::new(ErrorKind::Corrupted, "delta overflow".to_string()))?;
            values.push(value);
            prev = value;
        }
        Ok(values)
    }
}
