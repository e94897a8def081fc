//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use orchard_chat::LmStudioConfig;
use orchard_rag::openai::{self, OpenAiCompatibleEmbeddingProvider};
use orchard_rag::{EmbeddingProvider, HashingEmbeddingProvider, RagConfig};

/// Where document and query embeddings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbeddingBackend {
    /// The `/embeddings` endpoint of the LM Studio server.
    LmStudio,
    /// Local feature hashing; no server needed.
    Hashing,
}

/// Settings for `orchard-server`. Every flag can also be set through the
/// environment (a `.env` file is loaded first).
#[derive(Debug, Clone, Parser)]
#[command(name = "orchard-server", version, about = "Retrieval-augmented chat API for LM Studio")]
pub struct ServerConfig {
    /// Interface to bind.
    #[arg(long, env = "ORCHARD_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "ORCHARD_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory holding the persisted index.
    #[arg(long, env = "ORCHARD_INDEX_DIR", default_value = ".")]
    pub index_dir: PathBuf,

    /// File stem of the persisted index.
    #[arg(long, env = "ORCHARD_INDEX_NAME", default_value = "rag_index")]
    pub index_name: String,

    /// Maximum chunk size in characters.
    #[arg(long, env = "ORCHARD_CHUNK_SIZE", default_value_t = 500)]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, env = "ORCHARD_CHUNK_OVERLAP", default_value_t = 50)]
    pub chunk_overlap: usize,

    /// Chunks retrieved per question.
    #[arg(long, env = "ORCHARD_TOP_K", default_value_t = 3)]
    pub top_k: usize,

    /// LM Studio API root.
    #[arg(long, env = "LM_STUDIO_URL", default_value = orchard_chat::lmstudio::DEFAULT_BASE_URL)]
    pub lm_studio_url: String,

    /// Chat model to request; LM Studio uses the loaded model when unset.
    #[arg(long, env = "LM_STUDIO_CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Embedding backend.
    #[arg(long, env = "ORCHARD_EMBEDDINGS", value_enum, default_value_t = EmbeddingBackend::LmStudio)]
    pub embeddings: EmbeddingBackend,

    /// Embedding model served by LM Studio.
    #[arg(long, env = "LM_STUDIO_EMBEDDING_MODEL", default_value = openai::DEFAULT_MODEL)]
    pub embedding_model: String,

    /// Dimensionality of the embedding model.
    #[arg(long, env = "ORCHARD_EMBEDDING_DIMENSIONS", default_value_t = openai::DEFAULT_DIMENSIONS)]
    pub embedding_dimensions: usize,

    /// Timeout for requests to LM Studio, in seconds.
    #[arg(long, env = "ORCHARD_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    /// Address to bind, from `host` and `port`.
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid host/port {}:{}", self.host, self.port))
    }

    /// Index location and chunking settings for the context provider.
    pub fn rag_config(&self) -> orchard_rag::Result<RagConfig> {
        RagConfig::builder()
            .index_dir(&self.index_dir)
            .index_name(&self.index_name)
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .default_k(self.top_k)
            .build()
    }

    /// Connection settings for the chat client.
    pub fn lm_studio_config(&self) -> LmStudioConfig {
        let config = LmStudioConfig::new(&self.lm_studio_url)
            .with_timeout(Duration::from_secs(self.request_timeout_secs));
        match &self.chat_model {
            Some(model) => config.with_model(model),
            None => config,
        }
    }

    /// The embedding backend selected by `embeddings`.
    pub fn embedding_provider(&self) -> orchard_rag::Result<Arc<dyn EmbeddingProvider>> {
        let provider: Arc<dyn EmbeddingProvider> = match self.embeddings {
            EmbeddingBackend::LmStudio => Arc::new(
                OpenAiCompatibleEmbeddingProvider::with_timeout(
                    &self.lm_studio_url,
                    Duration::from_secs(self.request_timeout_secs),
                )?
                .with_model(&self.embedding_model)
                .with_dimensions(self.embedding_dimensions),
            ),
            EmbeddingBackend::Hashing => {
                Arc::new(HashingEmbeddingProvider::new(self.embedding_dimensions))
            }
        };
        Ok(provider)
    }
}
