//! Error types for the `orchard-chat` crate.

use thiserror::Error;

/// Errors that can occur while producing a chat reply.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Retrieving context or managing documents failed.
    #[error(transparent)]
    Rag(#[from] orchard_rag::RagError),

    /// The chat server could not be reached or the request failed in transit.
    #[error("Error communicating with LM Studio: {0}")]
    Request(String),

    /// The chat server answered with a non-success status.
    #[error("LM Studio returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error detail from the response body.
        message: String,
    },

    /// The response body was not a chat completion.
    #[error("Invalid chat completion response: {0}")]
    InvalidResponse(String),

    /// A reply was requested for a conversation without messages.
    #[error("Conversation has no messages")]
    EmptyConversation,
}

impl ChatError {
    /// Whether the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Rag(e) => e.is_config(),
            Self::EmptyConversation => true,
            _ => false,
        }
    }
}

/// A convenience result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;
