//! On-disk snapshots of a [`FlatIndex`].
//!
//! A snapshot is one JSON file:
//!
//! ```json
//! { "header": { "format_version": 1, "embedding_model": "...", "dimensions": 384,
//!               "metric": "cosine", "chunk_count": 2, "checksum": "<sha256>",
//!               "saved_at": "..." },
//!   "payload": [ ...chunks... ] }
//! ```
//!
//! The checksum covers the exact payload bytes. Snapshots are written to a
//! temporary file next to the target and renamed into place, so readers see
//! either the previous snapshot or the new one, never a partial write.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::document::Chunk;
use crate::error::{RagError, Result};
use crate::index::{DistanceMetric, FlatIndex};

/// Current snapshot layout version.
pub const FORMAT_VERSION: u32 = 1;

/// Metadata stored in front of the chunk payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotHeader {
    /// Layout version; snapshots with another version are rejected.
    pub format_version: u32,
    /// [`model_id`](crate::EmbeddingProvider::model_id) of the embedding function.
    pub embedding_model: String,
    /// Embedding dimensionality.
    pub dimensions: usize,
    /// Metric the index was searched with when saved.
    pub metric: DistanceMetric,
    /// Number of chunks in the payload.
    pub chunk_count: usize,
    /// Lower-case hex SHA-256 of the payload bytes.
    pub checksum: String,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    header: SnapshotHeader,
    payload: Box<RawValue>,
}

fn checksum(payload: &str) -> String {
    format!("{:x}", Sha256::digest(payload.as_bytes()))
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

/// Write `index` to `path`, replacing any previous snapshot atomically.
///
/// # Errors
///
/// Returns [`RagError::PersistenceError`] if serialization or any file
/// operation fails. The previous snapshot, if any, is left untouched.
pub async fn save(path: &Path, index: &FlatIndex, embedding_model: &str) -> Result<()> {
    let payload = serde_json::to_string(index.chunks())
        .map_err(|e| RagError::persistence(path, format!("failed to encode chunks: {e}")))?;
    let header = SnapshotHeader {
        format_version: FORMAT_VERSION,
        embedding_model: embedding_model.to_string(),
        dimensions: index.dimensions(),
        metric: index.metric(),
        chunk_count: index.len(),
        checksum: checksum(&payload),
        saved_at: Utc::now(),
    };
    let payload = RawValue::from_string(payload)
        .map_err(|e| RagError::persistence(path, format!("invalid payload: {e}")))?;
    let bytes = serde_json::to_vec(&Snapshot { header, payload })
        .map_err(|e| RagError::persistence(path, format!("failed to encode snapshot: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RagError::persistence(path, format!("failed to create directory: {e}")))?;
    }

    let tmp = temp_path(path);
    if let Err(e) = write_synced(&tmp, &bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(RagError::persistence(path, format!("failed to write snapshot: {e}")));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(RagError::persistence(path, format!("failed to replace snapshot: {e}")));
    }

    debug!(path = %path.display(), chunk_count = index.len(), bytes = bytes.len(), "snapshot saved");
    Ok(())
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Read the snapshot at `path`.
///
/// Returns `Ok(None)` when no snapshot exists. The returned index searches
/// with `metric`, whatever metric the snapshot was saved with.
///
/// # Errors
///
/// Returns [`RagError::PersistenceError`] if the file cannot be read, is not
/// a snapshot, has another format version, fails its checksum, or was built
/// by a different embedding model or dimensionality.
pub async fn load(
    path: &Path,
    embedding_model: &str,
    dimensions: usize,
    metric: DistanceMetric,
) -> Result<Option<FlatIndex>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RagError::persistence(path, format!("failed to read snapshot: {e}"))),
    };

    let snapshot: Snapshot = serde_json::from_slice(&bytes)
        .map_err(|e| RagError::persistence(path, format!("corrupt snapshot: {e}")))?;
    let header = snapshot.header;

    if header.format_version != FORMAT_VERSION {
        return Err(RagError::persistence(
            path,
            format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                header.format_version
            ),
        ));
    }
    if checksum(snapshot.payload.get()) != header.checksum {
        return Err(RagError::persistence(path, "checksum mismatch"));
    }
    if header.embedding_model != embedding_model || header.dimensions != dimensions {
        return Err(RagError::persistence(
            path,
            format!(
                "snapshot was built with '{}' ({} dimensions), provider is '{embedding_model}' \
                 ({dimensions} dimensions)",
                header.embedding_model, header.dimensions
            ),
        ));
    }
    if header.metric != metric {
        warn!(
            path = %path.display(),
            saved = ?header.metric,
            configured = ?metric,
            "snapshot metric differs from configuration, using configured metric"
        );
    }

    let chunks: Vec<Chunk> = serde_json::from_str(snapshot.payload.get())
        .map_err(|e| RagError::persistence(path, format!("corrupt payload: {e}")))?;
    if chunks.len() != header.chunk_count {
        return Err(RagError::persistence(
            path,
            format!("header lists {} chunks, payload has {}", header.chunk_count, chunks.len()),
        ));
    }

    let index = FlatIndex::from_parts(dimensions, metric, chunks)
        .map_err(|e| RagError::persistence(path, e.to_string()))?;
    debug!(path = %path.display(), chunk_count = index.len(), "snapshot loaded");
    Ok(Some(index))
}

/// Delete the snapshot at `path`. Returns whether a file was removed.
///
/// # Errors
///
/// Returns [`RagError::PersistenceError`] for any failure other than the file
/// being absent.
pub async fn remove(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RagError::persistence(path, format!("failed to delete snapshot: {e}"))),
    }
}
