use serde::{Deserialize, Serialize};

/// Lossy vector encodings a vector field can be searched with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    /// One signed byte per component, scaled between the column's min and max
    Int8,
    /// One bit per component: set when above the vector's mean
    Binary,
}

/// Quantized codes for every slot of a vector column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuantizedVectors {
    Int8 { min: f32, max: f32, codes: Vec<i8> },
    Binary { words: usize, bits: Vec<u64> },
}

/// A query vector encoded against one column's parameters
#[derive(Debug, Clone, PartialEq)]
pub enum QuantizedQuery {
    Int8 { codes: Vec<i8>, step: f32 },
    Binary { bits: Vec<u64> },
}

fn quantize_int8(value: f32, min: f32, max: f32) -> i8 {
    if max <= min {
        return 0;
    }
    let normalized = ((value - min) / (max - min)).clamp(0.0, 1.0);
    ((normalized * 255.0).round() as i32 - 128) as i8
}

fn binarize(vector: &[f32], words: usize) -> Vec<u64> {
    let mut bits = vec![0u64; words];
    if vector.is_empty() {
        return bits;
    }
    let mean = vector.iter().sum::<f32>() / vector.len() as f32;
    for (i, v) in vector.iter().enumerate() {
        if *v > mean {
            bits[i / 64] |= 1u64 << (i % 64);
        }
    }
    bits
}

impl QuantizedVectors {
    /// Encode `values`, a run of `dims`-wide vectors
    pub fn encode(quantization: Quantization, dims: usize, values: &[f32]) -> Self {
        let dims = dims.max(1);
        match quantization {
            Quantization::Int8 => {
                let (min, max) = values
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
                let (min, max) = if values.is_empty() { (0.0, 0.0) } else { (min, max) };
                QuantizedVectors::Int8 {
                    min,
                    max,
                    codes: values.iter().map(|v| quantize_int8(*v, min, max)).collect(),
                }
            }
            Quantization::Binary => {
                let words = dims.div_ceil(64);
                let bits = values.chunks(dims).flat_map(|v| binarize(v, words)).collect();
                QuantizedVectors::Binary { words, bits }
            }
        }
    }

    pub fn quantize_query(&self, query: &[f32]) -> QuantizedQuery {
        match self {
            QuantizedVectors::Int8 { min, max, .. } => QuantizedQuery::Int8 {
                codes: query.iter().map(|v| quantize_int8(*v, *min, *max)).collect(),
                step: (max - min).max(0.0) / 255.0,
            },
            QuantizedVectors::Binary { words, .. } => QuantizedQuery::Binary {
                bits: binarize(query, *words),
            },
        }
    }

    /// Approximate squared distance to the vector in slot `ordinal`.
    /// Int8 distances are scaled back to the float space so they compare
    /// across segments; binary distances are Hamming distances.
    pub fn distance(&self, query: &QuantizedQuery, ordinal: usize) -> Option<f32> {
        match (self, query) {
            (QuantizedVectors::Int8 { codes, .. }, QuantizedQuery::Int8 { codes: q, step }) => {
                let dims = q.len();
                let slot = codes.get(ordinal * dims..(ordinal + 1) * dims)?;
                let sum: i64 = slot
                    .iter()
                    .zip(q)
                    .map(|(a, b)| {
                        let d = *a as i64 - *b as i64;
                        d * d
                    })
                    .sum();
                Some(sum as f32 * step * step)
            }
            (QuantizedVectors::Binary { words, bits }, QuantizedQuery::Binary { bits: q }) => {
                let slot = bits.get(ordinal * words..(ordinal + 1) * words)?;
                Some(slot.iter().zip(q).map(|(a, b)| (a ^ b).count_ones()).sum::<u32>() as f32)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int8_codes_span_the_column_range() {
        let q = QuantizedVectors::encode(Quantization::Int8, 2, &[-1.0, 0.0, 1.0, 0.5]);
        match &q {
            QuantizedVectors::Int8 { min, max, codes } => {
                assert_eq!((*min, *max), (-1.0, 1.0));
                assert_eq!(codes[0], -128);
                assert_eq!(codes[2], 127);
            }
            other => panic!("unexpected encoding {:?}", other),
        }

        let query = q.quantize_query(&[1.0, 0.5]);
        assert_eq!(q.distance(&query, 1), Some(0.0));
        let far = q.distance(&query, 0).unwrap();
        // Exact squared distance is 4.25
        assert!((far - 4.25).abs() < 0.05, "{}", far);
        assert_eq!(q.distance(&query, 2), None);
    }

    #[test]
    fn test_constant_column_quantizes_to_zero() {
        let q = QuantizedVectors::encode(Quantization::Int8, 1, &[3.0, 3.0]);
        let query = q.quantize_query(&[10.0]);
        assert_eq!(q.distance(&query, 1), Some(0.0));
    }

    #[test]
    fn test_binary_hamming_distance() {
        let q = QuantizedVectors::encode(Quantization::Binary, 4, &[
            1.0, 0.0, 1.0, 0.0,
            0.0, 1.0, 0.0, 1.0,
        ]);
        let query = q.quantize_query(&[0.9, 0.1, 0.8, 0.2]);
        assert_eq!(q.distance(&query, 0), Some(0.0));
        assert_eq!(q.distance(&query, 1), Some(4.0));
    }

    #[test]
    fn test_binary_words_cover_wide_vectors() {
        let wide: Vec<f32> = (0..130).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let q = QuantizedVectors::encode(Quantization::Binary, 130, &wide);
        assert!(matches!(&q, QuantizedVectors::Binary { words: 3, bits } if bits.len() == 3));
        let query = q.quantize_query(&wide);
        assert_eq!(q.distance(&query, 0), Some(0.0));
    }
}
