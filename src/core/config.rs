use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::scoring::scorer::ScoringMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_path: PathBuf,

    // Document model
    pub id_field: String,

    // Analysis
    pub analyzer: String,               // used by text fields without their own analyzer

    // Query parser
    pub default_fields: Vec<String>,    // empty = every text field
    pub default_operator: DefaultOperator,
    pub max_query_depth: usize,
    pub max_clauses: usize,

    // Executor
    pub max_results: usize,
    pub scoring: ScoringMode,
    pub query_timeout_ms: Option<u64>,

    // Writer
    pub writer_batch_size: usize,       // active segment rotates at this many docs

    // Merging
    pub background_merge: bool,
    pub merge_factor: usize,            // merge once this many similar-sized segments exist
    pub max_merge_docs: usize,          // segments above this are never merged in background

    // Caches
    pub columnar_cache: bool,
    pub doc_cache_size: usize,          // stored documents kept decompressed per segment
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            id_field: "id".to_string(),
            analyzer: "standard".to_string(),
            default_fields: Vec::new(),
            default_operator: DefaultOperator::Or,
            max_query_depth: 32,
            max_clauses: 1024,
            max_results: 10,
            scoring: ScoringMode::Bm25,
            query_timeout_ms: None,
            writer_batch_size: 10_000,
            background_merge: true,
            merge_factor: 8,
            max_merge_docs: 1_000_000,
            columnar_cache: true,
            doc_cache_size: 256,
        }
    }
}

impl Config {
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// Load from a TOML file; missing keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            storage_path = "/tmp/segdex"
            scoring = "tfidf"
            default_operator = "and"
            writer_batch_size = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.storage_path, PathBuf::from("/tmp/segdex"));
        assert_eq!(config.scoring, ScoringMode::TfIdf);
        assert_eq!(config.default_operator, DefaultOperator::And);
        assert_eq!(config.writer_batch_size, 5);
        assert_eq!(config.id_field, "id");
        assert_eq!(config.max_results, 10);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = Config::from_toml_str("writer_batch_size = \"many\"").unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Parse);
    }
}
