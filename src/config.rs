use crate::embeddings::BatchOptions;
use crate::error::{RagError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Tunables for chunking, retrieval and the model providers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Embedding model id
    pub embedding_model: String,
    /// Output size of the embedding model
    pub embedding_dimensions: usize,
    /// Chat model id
    pub chat_model: String,
    /// Answer randomness, in [0, 1]
    pub temperature: f32,
    /// Passages retrieved per question
    pub top_k: usize,
    /// Maximum passage length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive passages
    pub chunk_overlap: usize,
    /// Texts sent per embedding request
    pub embed_batch_size: usize,
    /// Embedding requests in flight during index build
    pub embed_concurrency: usize,
    /// Deadline for any single provider call
    pub request_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        RagConfig {
            embedding_model: "text-embedding-004".to_string(),
            embedding_dimensions: 768,
            chat_model: "gemini-2.0-flash".to_string(),
            temperature: 0.5,
            top_k: 4,
            chunk_size: 1024,
            chunk_overlap: 128,
            embed_batch_size: 32,
            embed_concurrency: 4,
            request_timeout_secs: 30,
        }
    }
}

impl RagConfig {
    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| RagError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Apply `RAG_*` environment variable overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(model) = env::var("RAG_EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        if let Ok(model) = env::var("RAG_CHAT_MODEL") {
            self.chat_model = model;
        }
        override_from_env("RAG_EMBEDDING_DIMENSIONS", &mut self.embedding_dimensions)?;
        override_from_env("RAG_TEMPERATURE", &mut self.temperature)?;
        override_from_env("RAG_TOP_K", &mut self.top_k)?;
        override_from_env("RAG_CHUNK_SIZE", &mut self.chunk_size)?;
        override_from_env("RAG_CHUNK_OVERLAP", &mut self.chunk_overlap)?;
        override_from_env("RAG_EMBED_BATCH_SIZE", &mut self.embed_batch_size)?;
        override_from_env("RAG_EMBED_CONCURRENCY", &mut self.embed_concurrency)?;
        override_from_env("RAG_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs)?;
        Ok(self)
    }

    /// Check that the values are usable together
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".into()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(RagError::Config(format!(
                "temperature ({}) must be within [0, 1]",
                self.temperature
            )));
        }
        if self.embedding_dimensions == 0 {
            return Err(RagError::Config(
                "embedding_dimensions must be greater than zero".into(),
            ));
        }
        if self.embed_batch_size == 0 || self.embed_concurrency == 0 {
            return Err(RagError::Config(
                "embed_batch_size and embed_concurrency must be greater than zero".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::Config(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// How the vector index calls the embedding service
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.embed_batch_size,
            concurrency: self.embed_concurrency,
            request_timeout: self.request_timeout(),
        }
    }
}

fn override_from_env<T>(key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = env::var(key) {
        debug!("Overriding config from {}", key);
        *target = raw
            .trim()
            .parse()
            .map_err(|e| RagError::Config(format!("Invalid value for {}: {}", key, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RagConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_chunk() {
        let config = RagConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..RagConfig::default()
        };
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_rejects_temperature_out_of_range() {
        let config = RagConfig {
            temperature: 1.5,
            ..RagConfig::default()
        };
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let config = RagConfig {
            top_k: 0,
            ..RagConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: RagConfig = serde_json::from_str(r#"{"top_k": 2, "temperature": 0.1}"#).unwrap();
        assert_eq!(config.top_k, 2);
        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.chunk_size, RagConfig::default().chunk_size);
    }
}
