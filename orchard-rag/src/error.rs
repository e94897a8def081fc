//! Error types for the `orchard-rag` crate.

use std::path::Path;

use thiserror::Error;

/// Errors that can occur in retrieval operations.
///
/// An absent or empty index is not an error: queries against it return an
/// empty context instead.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration or argument validation error, such as a metadata list
    /// whose length differs from the document list.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Reading, writing or decoding the persisted index failed.
    #[error("Persistence error ({path}): {message}")]
    PersistenceError {
        /// The snapshot path involved.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// The similarity index rejected an operation.
    #[error("Index error: {0}")]
    IndexError(String),
}

impl RagError {
    pub(crate) fn persistence(path: &Path, message: impl Into<String>) -> Self {
        Self::PersistenceError { path: path.display().to_string(), message: message.into() }
    }

    /// Whether the error was caused by invalid input rather than a failing
    /// collaborator (embedding backend or disk).
    pub fn is_config(&self) -> bool {
        matches!(self, Self::ConfigError(_))
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
