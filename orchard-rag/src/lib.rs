//! # orchard-rag
//!
//! Retrieval context for a local chat assistant: documents are split into
//! overlapping chunks, embedded, stored in a persisted similarity index, and
//! the chunks nearest to a query are joined into a context string ready to be
//! injected into a chat prompt.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use orchard_rag::{ContextProvider, HashingEmbeddingProvider, RagConfig};
//!
//! let provider =
//!     ContextProvider::open(RagConfig::default(), Arc::new(HashingEmbeddingProvider::default()))
//!         .await?;
//! provider.add_documents(&["Bananas are rich in potassium."], None).await?;
//! let context = provider.get_relevant_context("potassium", None).await?;
//! ```
//!
//! ## Features
//!
//! - `openai` (default): [`openai::OpenAiCompatibleEmbeddingProvider`] for
//!   LM Studio and other OpenAI-compatible embedding servers.

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod hashing;
pub mod index;
pub mod persistence;
pub mod provider;

#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, ChunkingStrategy, FixedSizeChunker, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, Metadata, MetadataValue, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use hashing::HashingEmbeddingProvider;
pub use index::{DistanceMetric, FlatIndex};
pub use provider::{CONTEXT_SEPARATOR, ContextProvider, ContextProviderBuilder};
