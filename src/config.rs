use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{QuarryError, Result};

/// Major on-disk format version. A mismatch forces a rebuild.
pub const MAJOR_VERSION: u32 = 10;

/// Index settings configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub tokenizer_config: TokenizerConfig,
    /// Minor format version, owned by the embedding application
    pub minor_version: u32,
    /// Upper bound on clauses in a single boolean postings query
    pub max_clause_count: usize,
    /// Largest indexed field value accepted by a store writer
    pub max_field_bytes: usize,
    /// Fraction of the match count walked before giving up on the timestamp short-circuit
    pub short_circuit_factor: f64,
    pub busy_retry: BusyRetryPolicy,
    pub default_max_hits: usize,
    /// Reported as the source of every hit
    pub source_name: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            tokenizer_config: TokenizerConfig::default(),
            minor_version: 0,
            max_clause_count: 1024,
            max_field_bytes: 4 * 1024 * 1024,
            short_circuit_factor: 1.25,
            busy_retry: BusyRetryPolicy::default(),
            default_max_hits: 100,
            source_name: "quarry".to_string(),
        }
    }
}

impl IndexSettings {
    /// Load settings from a JSON file; missing keys fall back to defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| QuarryError::InvalidRequest(format!("bad settings file: {}", e)))
    }

    /// Version string written to the index directory
    pub fn version_string(&self) -> String {
        format!("{}.{}", MAJOR_VERSION, self.minor_version)
    }

    pub fn with_minor_version(mut self, minor: u32) -> Self {
        self.minor_version = minor;
        self
    }

    pub fn with_max_clause_count(mut self, max: usize) -> Self {
        self.max_clause_count = max;
        self
    }

    pub fn with_max_field_bytes(mut self, max: usize) -> Self {
        self.max_field_bytes = max;
        self
    }

    pub fn with_short_circuit_factor(mut self, factor: f64) -> Self {
        self.short_circuit_factor = factor;
        self
    }

    pub fn with_busy_retry(mut self, policy: BusyRetryPolicy) -> Self {
        self.busy_retry = policy;
        self
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    pub fn with_tokenizer(mut self, config: TokenizerConfig) -> Self {
        self.tokenizer_config = config;
        self
    }
}

/// Bounded retry for writers that find a store locked
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusyRetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for BusyRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 20,
        }
    }
}

impl BusyRetryPolicy {
    /// Backoff before the given attempt (1-based), doubling each time
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(6);
        Duration::from_millis(self.backoff_ms << shift)
    }
}

/// Tokenizer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub lowercase: bool,
    pub remove_stopwords: bool,
    pub stem: bool,
    pub min_token_length: usize,
    pub max_token_length: usize,
    pub language: String,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_stopwords: true,
            stem: true,
            min_token_length: 1,
            max_token_length: 64,
            language: "english".to_string(),
        }
    }
}
