//! Configuration for the retrieval context provider.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chunking::ChunkingStrategy;
use crate::error::{RagError, Result};
use crate::index::DistanceMetric;

/// File extension of persisted index snapshots.
pub const SNAPSHOT_EXTENSION: &str = "json";

/// Configuration parameters for a [`ContextProvider`](crate::ContextProvider).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks returned when the caller does not specify `k`.
    pub default_k: usize,
    /// Directory holding the persisted index.
    pub index_dir: PathBuf,
    /// Identifier the snapshot file name is derived from.
    pub index_name: String,
    /// Distance metric used for nearest-neighbor lookup.
    pub metric: DistanceMetric,
    /// How documents are split into chunks.
    pub strategy: ChunkingStrategy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            default_k: 3,
            index_dir: PathBuf::from("."),
            index_name: "rag_index".to_string(),
            metric: DistanceMetric::default(),
            strategy: ChunkingStrategy::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Path of the persisted snapshot: `{index_dir}/{index_name}.json`.
    pub fn index_path(&self) -> PathBuf {
        self.index_dir.join(format!("{}.{SNAPSHOT_EXTENSION}", self.index_name))
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `default_k == 0`
    /// - `index_name` is empty or contains a path separator
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.default_k == 0 {
            return Err(RagError::ConfigError("default_k must be greater than zero".to_string()));
        }
        if self.index_name.is_empty() || self.index_name.contains(['/', '\\']) {
            return Err(RagError::ConfigError(format!(
                "index_name '{}' must be a non-empty file stem",
                self.index_name
            )));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the default number of chunks returned per query.
    pub fn default_k(mut self, k: usize) -> Self {
        self.config.default_k = k;
        self
    }

    /// Set the directory holding the persisted index.
    pub fn index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.index_dir = dir.into();
        self
    }

    /// Set the identifier the snapshot file name is derived from.
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.config.index_name = name.into();
        self
    }

    /// Set the distance metric.
    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Set the chunking strategy.
    pub fn strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
