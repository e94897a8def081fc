//! # orchard-chat
//!
//! Retrieval-augmented chat against a local LM Studio server.
//!
//! - [`ChatAssistant`] injects context from an [`orchard_rag::ContextProvider`]
//!   into the conversation before asking the model.
//! - [`LmStudioClient`] talks to LM Studio's OpenAI-compatible
//!   `/chat/completions` endpoint.
//! - [`ChatModel`] is the seam between the two; tests plug in scripted models.

pub mod assistant;
pub mod error;
pub mod lmstudio;
pub mod message;
pub mod model;

pub use assistant::{ChatAssistant, context_message};
pub use error::{ChatError, Result};
pub use lmstudio::{LmStudioClient, LmStudioConfig};
pub use message::{ChatHistory, ChatMessage, ChatOptions, Role};
pub use model::ChatModel;
