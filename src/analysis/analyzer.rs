use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use rust_stemmers::Algorithm;
use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::lowercase::LowercaseFilter;
use crate::analysis::filters::stemmer::StemmerFilter;
use crate::analysis::filters::stopword::StopWordFilter;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer, WhitespaceTokenizer};
use crate::core::error::{Error, ErrorKind, Result};

/// Text analysis pipeline
pub struct Analyzer {
    pub tokenizer: Box<dyn Tokenizer>,
    pub filters: Vec<Box<dyn TokenFilter>>,
    pub name: String,
}

impl Analyzer {
    pub fn new(name: String, tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer {
            tokenizer,
            filters: Vec::new(),
            name,
        }
    }

    pub fn add_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);

        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }

        tokens
    }

    /// Unicode words, lowercased
    pub fn standard() -> Self {
        Analyzer::new("standard".to_string(), Box::new(StandardTokenizer::default()))
            .add_filter(Box::new(LowercaseFilter))
    }

    /// Standard plus English stop-word removal
    pub fn standard_stop() -> Self {
        Analyzer::new("stop".to_string(), Box::new(StandardTokenizer::default()))
            .add_filter(Box::new(LowercaseFilter))
            .add_filter(Box::new(StopWordFilter::english()))
    }

    /// Create standard analyzer for English
    pub fn standard_english() -> Self {
        Analyzer::new("english".to_string(), Box::new(StandardTokenizer::default()))
            .add_filter(Box::new(LowercaseFilter))
            .add_filter(Box::new(StopWordFilter::english()))
            .add_filter(Box::new(StemmerFilter::new(Algorithm::English)))
    }

    pub fn whitespace() -> Self {
        Analyzer::new("whitespace".to_string(), Box::new(WhitespaceTokenizer))
    }
}

/// Registry for managing analyzers
pub struct AnalyzerRegistry {
    analyzers: RwLock<HashMap<String, Arc<Analyzer>>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        let registry = AnalyzerRegistry {
            analyzers: RwLock::new(HashMap::new()),
        };

        registry.register_defaults();
        registry
    }

    fn register_defaults(&self) {
        self.register("standard", Analyzer::standard());
        self.register("stop", Analyzer::standard_stop());
        self.register("english", Analyzer::standard_english());
        self.register("whitespace", Analyzer::whitespace());
    }

    pub fn register(&self, name: &str, analyzer: Analyzer) {
        self.analyzers.write().insert(name.to_string(), Arc::new(analyzer));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Analyzer>> {
        self.analyzers.read().get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<Analyzer>> {
        self.get(name).ok_or_else(|| Error {
            kind: ErrorKind::NotFound,
            context: format!("Analyzer '{}' not found", name),
        })
    }

    pub fn analyze(&self, analyzer_name: &str, text: &str) -> Result<Vec<Token>> {
        Ok(self.require(analyzer_name)?.analyze(text))
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_keeps_stop_words() {
        let tokens = Analyzer::standard().analyze("The Quick Fox");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["the", "quick", "fox"]);
    }

    #[test]
    fn test_stop_analyzer_drops_the() {
        let tokens = Analyzer::standard_stop().analyze("The Quick Fox");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].position, 1);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = AnalyzerRegistry::new();
        assert!(registry.get("english").is_some());
        let err = registry.analyze("missing", "text").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let tokens = registry.analyze("english", "running dogs").unwrap();
        assert_eq!(tokens[0].text, "run");
        assert_eq!(tokens[1].text, "dog");
    }
}
