use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use stop_words::{get, LANGUAGE};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::TokenizerConfig;

/// Text tokenizer with stemming and stopword removal
///
/// The same instance analyzes document text at build time and phrase
/// text at query time, so both sides agree on terms and positions.
pub struct Tokenizer {
    config: TokenizerConfig,
    stemmer: Option<Stemmer>,
    stopwords: HashSet<String>,
}

fn algorithm_for(language: &str) -> Algorithm {
    match language.to_lowercase().as_str() {
        "french" => Algorithm::French,
        "german" => Algorithm::German,
        "spanish" => Algorithm::Spanish,
        "italian" => Algorithm::Italian,
        "portuguese" => Algorithm::Portuguese,
        "dutch" => Algorithm::Dutch,
        "swedish" => Algorithm::Swedish,
        "russian" => Algorithm::Russian,
        _ => Algorithm::English,
    }
}

impl Tokenizer {
    /// Create a new tokenizer from configuration
    pub fn new(config: &TokenizerConfig) -> Self {
        let stemmer = if config.stem {
            Some(Stemmer::create(algorithm_for(&config.language)))
        } else {
            None
        };

        let stopwords = if config.remove_stopwords {
            get(LANGUAGE::English)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect()
        } else {
            HashSet::new()
        };

        Self {
            config: config.clone(),
            stemmer,
            stopwords,
        }
    }

    /// Tokenize text into a vector of terms
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.tokenize_with_positions_ordered(text)
            .into_iter()
            .map(|(term, _)| term)
            .collect()
    }

    /// Tokenize and return (term, position) pairs in order
    ///
    /// Filtered words (stopwords, out-of-range lengths) still advance the
    /// position counter, so phrase offsets survive filtering.
    pub fn tokenize_with_positions_ordered(&self, text: &str) -> Vec<(String, u32)> {
        let mut results = Vec::new();
        let mut pos = 0u32;

        for word in text.unicode_words() {
            if let Some(token) = self.analyze_word(word) {
                results.push((token, pos));
            }
            pos += 1;
        }

        results
    }

    /// Normalize a single keyword value. Keywords are never split or stemmed.
    pub fn keyword(&self, value: &str) -> String {
        value.to_string()
    }

    fn analyze_word(&self, word: &str) -> Option<String> {
        let mut token = word.to_string();

        if self.config.lowercase {
            token = token.to_lowercase();
        }

        let len = token.chars().count();
        if len < self.config.min_token_length || len > self.config.max_token_length {
            return None;
        }

        if self.stopwords.contains(&token) {
            return None;
        }

        if let Some(stemmer) = &self.stemmer {
            token = stemmer.stem(&token).to_string();
        }

        Some(token)
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("config", &self.config)
            .field("stopwords", &self.stopwords.len())
            .finish()
    }
}
