//! Exact nearest-neighbor similarity index.
//!
//! [`FlatIndex`] keeps every embedded [`Chunk`] in insertion order and scores
//! all of them on each search. It is serializable so the whole index can be
//! persisted as one snapshot.

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};

/// How the distance between two embeddings is measured.
///
/// Scores are always "higher is nearer": [`DistanceMetric::Euclidean`]
/// reports the negated L2 distance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Negated Euclidean (L2) distance.
    Euclidean,
    /// Raw dot product.
    DotProduct,
}

impl DistanceMetric {
    /// Score `b` against `a` under this metric.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::Euclidean => {
                -a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
            }
            Self::DotProduct => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// An exact similarity index over embedded chunks.
///
/// Every stored chunk carries exactly one embedding of the index's
/// dimensionality; [`insert`](FlatIndex::insert) rejects anything else.
///
/// # Example
///
/// ```rust,ignore
/// use orchard_rag::{DistanceMetric, FlatIndex};
///
/// let mut index = FlatIndex::new(384, DistanceMetric::Cosine);
/// index.insert(chunks)?;
/// let results = index.search(&query_embedding, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatIndex {
    dimensions: usize,
    metric: DistanceMetric,
    chunks: Vec<Chunk>,
}

impl FlatIndex {
    /// Create an empty index.
    pub fn new(dimensions: usize, metric: DistanceMetric) -> Self {
        Self { dimensions, metric, chunks: Vec::new() }
    }

    /// Rebuild an index from chunks read back from storage.
    pub(crate) fn from_parts(
        dimensions: usize,
        metric: DistanceMetric,
        chunks: Vec<Chunk>,
    ) -> Result<Self> {
        let mut index = Self::new(dimensions, metric);
        index.insert(chunks)?;
        Ok(index)
    }

    /// Embedding dimensionality accepted by this index.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Distance metric used for search.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Stored chunks in insertion order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Append chunks. Duplicates are kept: the index never deduplicates.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexError`] without inserting anything if any chunk's
    /// embedding length differs from the index dimensionality.
    pub fn insert(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != self.dimensions) {
            return Err(RagError::IndexError(format!(
                "chunk '{}' has {} dimensions, index expects {}",
                bad.id,
                bad.embedding.len(),
                self.dimensions
            )));
        }
        self.chunks.extend(chunks);
        Ok(())
    }

    /// Drop every chunk after the first `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.chunks.truncate(len);
    }

    /// Search for the `top_k` chunks nearest to `embedding`.
    ///
    /// Returns results ordered by descending score; equal scores keep
    /// insertion order.
    pub fn search(&self, embedding: &[f32], top_k: usize) -> Vec<SearchResult> {
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, self.metric.score(&chunk.embedding, embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
            .into_iter()
            .map(|(i, score)| SearchResult { chunk: self.chunks[i].clone(), score })
            .collect()
    }
}
