//! Retrieval context provider.
//!
//! The [`ContextProvider`] owns a persisted [`FlatIndex`] and coordinates
//! document ingestion (chunk → embed → insert → persist) and context lookup
//! (embed → search → join) for a chat prompt.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use orchard_rag::{ContextProvider, HashingEmbeddingProvider, RagConfig};
//!
//! let provider = ContextProvider::open(
//!     RagConfig::builder().index_dir("data").build()?,
//!     Arc::new(HashingEmbeddingProvider::default()),
//! )
//! .await?;
//!
//! provider.add_documents(&["The quick brown fox."], None).await?;
//! let context = provider.get_relevant_context("fox", Some(1)).await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::document::{Chunk, Document, Metadata, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::FlatIndex;
use crate::persistence;

/// Separator placed between chunk texts in a retrieved context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// A persisted similarity index over user-supplied documents.
///
/// The index is created lazily by the first ingestion that yields chunks,
/// grows with every later ingestion, and is only destroyed by
/// [`clear_database`](ContextProvider::clear_database).
///
/// Writers ([`add_batch`](ContextProvider::add_batch),
/// [`clear_database`](ContextProvider::clear_database),
/// [`reload`](ContextProvider::reload)) hold the write lock across
/// insert-and-persist, so concurrent callers sharing one provider never lose
/// updates. Queries embed without any lock and hold the read lock only while
/// searching.
pub struct ContextProvider {
    config: RagConfig,
    index_path: PathBuf,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn Chunker>,
    index: RwLock<Option<FlatIndex>>,
}

impl std::fmt::Debug for ContextProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextProvider")
            .field("config", &self.config)
            .field("embedding_model", &self.embedding_provider.model_id())
            .finish_non_exhaustive()
    }
}

impl ContextProvider {
    /// Create a new [`ContextProviderBuilder`].
    pub fn builder() -> ContextProviderBuilder {
        ContextProviderBuilder::default()
    }

    /// Open a provider with the chunker selected by `config.strategy`,
    /// loading the snapshot at [`RagConfig::index_path`] if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an invalid configuration and
    /// [`RagError::PersistenceError`] for an unreadable or incompatible snapshot.
    pub async fn open(
        config: RagConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        Self::builder().config(config).embedding_provider(embedding_provider).open().await
    }

    /// Return a reference to the provider configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Path of the persisted snapshot.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Number of chunks `k` used when a query does not specify one.
    pub fn default_k(&self) -> usize {
        self.config.default_k
    }

    /// Number of chunks in the index.
    pub async fn len(&self) -> usize {
        self.index.read().await.as_ref().map_or(0, FlatIndex::len)
    }

    /// Whether the index is absent or holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Add raw texts with optional per-document metadata.
    ///
    /// `metadatas[i]` is attached to every chunk of `documents[i]`. Returns the
    /// number of chunks added.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] before any embedding call when
    /// `metadatas` is given with a different length than `documents`, and
    /// otherwise the errors of [`add_batch`](ContextProvider::add_batch).
    pub async fn add_documents<S: AsRef<str>>(
        &self,
        documents: &[S],
        metadatas: Option<&[Metadata]>,
    ) -> Result<usize> {
        if let Some(metadatas) = metadatas {
            if metadatas.len() != documents.len() {
                error!(
                    documents = documents.len(),
                    metadatas = metadatas.len(),
                    "metadata count does not match document count"
                );
                return Err(RagError::ConfigError(format!(
                    "got {} metadata entries for {} documents",
                    metadatas.len(),
                    documents.len()
                )));
            }
        }

        let documents = documents
            .iter()
            .enumerate()
            .map(|(i, text)| Document {
                text: text.as_ref().to_string(),
                metadata: metadatas.map(|m| m[i].clone()).unwrap_or_default(),
            })
            .collect();
        self.add_batch(documents).await
    }

    /// Add a single document. Returns the number of chunks added.
    ///
    /// # Errors
    ///
    /// See [`add_batch`](ContextProvider::add_batch).
    pub async fn add_document(&self, document: Document) -> Result<usize> {
        self.add_batch(vec![document]).await
    }

    /// Ingest documents: chunk → embed → insert → persist.
    ///
    /// Every call gets a fresh batch id, so re-adding the same text stores
    /// duplicate chunks. A batch that yields no chunks changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if embedding fails and
    /// [`RagError::PersistenceError`] if the snapshot cannot be written. In
    /// both cases the in-memory index is left as it was before the call.
    pub async fn add_batch(&self, documents: Vec<Document>) -> Result<usize> {
        // 1. Chunk every document
        let batch_id = uuid::Uuid::new_v4().simple().to_string();
        let mut chunks: Vec<Chunk> = documents
            .iter()
            .enumerate()
            .flat_map(|(i, document)| self.chunker.chunk(&format!("{batch_id}_{i}"), document))
            .collect();
        if chunks.is_empty() {
            info!(document_count = documents.len(), chunk_count = 0, "ingested batch (empty)");
            return Ok(0);
        }

        // 2. Embed outside the lock; the index is not touched yet
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            error!(batch_id = %batch_id, error = %e, "embedding failed during ingestion");
            e
        })?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingError {
                provider: self.embedding_provider.model_id().to_string(),
                message: format!(
                    "requested {} embeddings, received {}",
                    chunks.len(),
                    embeddings.len()
                ),
            });
        }
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }
        let chunk_count = chunks.len();

        // 3. Insert and persist under the write lock
        let mut guard = self.index.write().await;
        let index = guard.get_or_insert_with(|| {
            debug!(path = %self.index_path.display(), "creating index");
            FlatIndex::new(self.embedding_provider.dimensions(), self.config.metric)
        });
        let previous_len = index.len();
        if let Err(e) = index.insert(chunks) {
            if index.is_empty() {
                *guard = None;
            }
            return Err(e);
        }

        if let Err(e) =
            persistence::save(&self.index_path, index, self.embedding_provider.model_id()).await
        {
            error!(path = %self.index_path.display(), error = %e, "failed to persist index");
            index.truncate(previous_len);
            if index.is_empty() {
                *guard = None;
            }
            return Err(e);
        }

        info!(
            batch_id = %batch_id,
            document_count = documents.len(),
            chunk_count,
            total_chunks = index.len(),
            "ingested batch"
        );
        Ok(chunk_count)
    }

    /// Retrieve the `k` nearest chunks for `query`, nearest first.
    ///
    /// `k` defaults to [`RagConfig::default_k`] when `None`. An absent or empty
    /// index yields no results without calling the embedding provider.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for `k == 0` and
    /// [`RagError::EmbeddingError`] if the query cannot be embedded.
    pub async fn search(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let k = k.unwrap_or(self.config.default_k);
        if k == 0 {
            return Err(RagError::ConfigError("k must be at least 1".to_string()));
        }

        let dimensions = match self.index.read().await.as_ref() {
            Some(index) if !index.is_empty() => index.dimensions(),
            _ => {
                debug!("no index available, returning empty context");
                return Ok(Vec::new());
            }
        };

        let query_embedding = self.embedding_provider.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;
        if query_embedding.len() != dimensions {
            return Err(RagError::EmbeddingError {
                provider: self.embedding_provider.model_id().to_string(),
                message: format!(
                    "query embedding has {} dimensions, index expects {dimensions}",
                    query_embedding.len()
                ),
            });
        }

        let guard = self.index.read().await;
        let Some(index) = guard.as_ref() else {
            debug!("index cleared during query, returning empty context");
            return Ok(Vec::new());
        };
        let results = index.search(&query_embedding, k);
        info!(k, result_count = results.len(), "query completed");
        Ok(results)
    }

    /// Retrieve the `k` most relevant chunk texts joined by a blank line,
    /// nearest first. Returns `""` when the index is absent or empty.
    ///
    /// # Errors
    ///
    /// See [`search`](ContextProvider::search).
    pub async fn get_relevant_context(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<String> {
        let results = self.search(query, k).await?;
        Ok(results.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR))
    }

    /// Discard the index and delete its snapshot. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceError`] if an existing snapshot cannot be
    /// deleted; the in-memory index is kept in that case.
    pub async fn clear_database(&self) -> Result<()> {
        let mut guard = self.index.write().await;
        let removed = persistence::remove(&self.index_path).await.map_err(|e| {
            error!(path = %self.index_path.display(), error = %e, "failed to delete index");
            e
        })?;
        let discarded = guard.take().map_or(0, |index| index.len());
        info!(removed_snapshot = removed, discarded_chunks = discarded, "index cleared");
        Ok(())
    }

    /// Replace the in-memory index with the snapshot currently on disk.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceError`] for an unreadable or
    /// incompatible snapshot; the in-memory index is kept in that case.
    pub async fn reload(&self) -> Result<()> {
        let mut guard = self.index.write().await;
        *guard = self.load_snapshot().await?;
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Option<FlatIndex>> {
        let index = persistence::load(
            &self.index_path,
            self.embedding_provider.model_id(),
            self.embedding_provider.dimensions(),
            self.config.metric,
        )
        .await?;
        info!(
            path = %self.index_path.display(),
            chunk_count = index.as_ref().map_or(0, FlatIndex::len),
            "index loaded"
        );
        Ok(index)
    }
}

/// Builder for constructing a [`ContextProvider`].
///
/// The embedding provider is required. The configuration defaults to
/// [`RagConfig::default`] and the chunker to the one selected by the
/// configuration's strategy.
///
/// # Example
///
/// ```rust,ignore
/// let provider = ContextProvider::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .chunker(Arc::new(RecursiveChunker::new(200, 20)))  // optional
///     .open()
///     .await?;
/// ```
#[derive(Default)]
pub struct ContextProviderBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl ContextProviderBuilder {
    /// Set the provider configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Validate the configuration and load any existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the embedding provider is missing or
    /// the configuration is invalid, and [`RagError::PersistenceError`] for an
    /// unreadable or incompatible snapshot.
    pub async fn open(self) -> Result<ContextProvider> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let chunker = self
            .chunker
            .unwrap_or_else(|| config.strategy.chunker(config.chunk_size, config.chunk_overlap));

        let provider = ContextProvider {
            index_path: config.index_path(),
            config,
            embedding_provider,
            chunker,
            index: RwLock::new(None),
        };
        let index = provider.load_snapshot().await?;
        *provider.index.write().await = index;
        Ok(provider)
    }
}
