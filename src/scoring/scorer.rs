use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Relevance function selected per query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    TfIdf,
    #[default]
    Bm25,
}

impl ScoringMode {
    pub fn scorer(&self) -> Box<dyn Scorer> {
        match self {
            ScoringMode::TfIdf => Box::new(TfIdfScorer::new(true)),
            ScoringMode::Bm25 => Box::new(BM25Scorer::default()),
        }
    }
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tfidf" | "tf-idf" => Ok(ScoringMode::TfIdf),
            "bm25" => Ok(ScoringMode::Bm25),
            other => Err(format!("unknown scoring mode '{}'", other)),
        }
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringMode::TfIdf => write!(f, "tfidf"),
            ScoringMode::Bm25 => write!(f, "bm25"),
        }
    }
}

/// Field statistics for scoring
#[derive(Debug, Clone, Copy)]
pub struct FieldStats {
    pub field_length: u32,     // Tokens in this document's field
    pub avg_field_length: f32, // Average over live documents
}

/// Scorer trait
pub trait Scorer: Send + Sync {
    /// Inverse document frequency over live documents
    fn idf(&self, doc_freq: u64, total_docs: u64) -> f32;

    fn score(&self, term_freq: u32, idf: f32, stats: &FieldStats) -> f32;

    fn name(&self) -> &str;
}

/// TF-IDF Scorer
pub struct TfIdfScorer {
    pub normalize: bool,
}

impl TfIdfScorer {
    pub fn new(normalize: bool) -> Self {
        TfIdfScorer { normalize }
    }
}

impl Scorer for TfIdfScorer {
    fn idf(&self, doc_freq: u64, total_docs: u64) -> f32 {
        1.0 + ((total_docs as f32 + 1.0) / (doc_freq as f32 + 1.0)).ln()
    }

    fn score(&self, term_freq: u32, idf: f32, stats: &FieldStats) -> f32 {
        let tf = (term_freq as f32).sqrt();
        // Shorter fields weigh more
        let norm = if self.normalize && stats.field_length > 0 {
            1.0 / (stats.field_length as f32).sqrt()
        } else {
            1.0
        };

        tf * idf * norm
    }

    fn name(&self) -> &str {
        "tfidf"
    }
}

/// BM25 Scorer
pub struct BM25Scorer {
    pub k1: f32,  // Term frequency saturation (default: 1.2)
    pub b: f32,   // Length normalization strength (default: 0.75)
}

impl Default for BM25Scorer {
    fn default() -> Self {
        BM25Scorer {
            k1: 1.2,
            b: 0.75,
        }
    }
}

impl Scorer for BM25Scorer {
    fn idf(&self, doc_freq: u64, total_docs: u64) -> f32 {
        let n = total_docs as f32;
        let df = doc_freq as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn score(&self, term_freq: u32, idf: f32, stats: &FieldStats) -> f32 {
        let tf = term_freq as f32;
        let doc_len = stats.field_length as f32;
        let length_ratio = if stats.avg_field_length > 0.0 {
            doc_len / stats.avg_field_length
        } else {
            1.0
        };

        // BM25 formula
        let numerator = idf * tf * (self.k1 + 1.0);
        let denominator = tf + self.k1 * (1.0 - self.b + self.b * length_ratio);

        numerator / denominator
    }

    fn name(&self) -> &str {
        "bm25"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(len: u32, avg: f32) -> FieldStats {
        FieldStats {
            field_length: len,
            avg_field_length: avg,
        }
    }

    #[test]
    fn test_bm25_idf_positive_for_common_terms() {
        let scorer = BM25Scorer::default();
        assert!(scorer.idf(2, 2) > 0.0);
        assert!(scorer.idf(1, 100) > scorer.idf(50, 100));
    }

    #[test]
    fn test_bm25_prefers_shorter_fields() {
        let scorer = BM25Scorer::default();
        let idf = scorer.idf(1, 10);
        let short = scorer.score(1, idf, &stats(3, 6.0));
        let long = scorer.score(1, idf, &stats(12, 6.0));
        assert!(short > long);
    }

    #[test]
    fn test_bm25_saturates_term_frequency() {
        let scorer = BM25Scorer::default();
        let idf = scorer.idf(1, 10);
        let gain_low = scorer.score(2, idf, &stats(5, 5.0)) - scorer.score(1, idf, &stats(5, 5.0));
        let gain_high = scorer.score(20, idf, &stats(5, 5.0)) - scorer.score(19, idf, &stats(5, 5.0));
        assert!(gain_low > gain_high);
    }

    #[test]
    fn test_tfidf_grows_with_frequency() {
        let scorer = TfIdfScorer::new(true);
        let idf = scorer.idf(3, 10);
        assert!(scorer.score(4, idf, &stats(10, 8.0)) > scorer.score(1, idf, &stats(10, 8.0)));
        assert!(scorer.idf(0, 0) > 0.0);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("BM25".parse::<ScoringMode>().unwrap(), ScoringMode::Bm25);
        assert_eq!("tfidf".parse::<ScoringMode>().unwrap(), ScoringMode::TfIdf);
        assert!("cosine".parse::<ScoringMode>().is_err());
        assert_eq!(ScoringMode::TfIdf.scorer().name(), "tfidf");
        assert_eq!(serde_json::to_string(&ScoringMode::Bm25).unwrap(), "\"bm25\"");
    }
}
