//! The completion backend seam.

use async_trait::async_trait;

use crate::error::Result;
use crate::message::{ChatMessage, ChatOptions};

/// A chat completion backend.
///
/// [`LmStudioClient`](crate::LmStudioClient) is the production implementation;
/// tests substitute a scripted model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce the assistant's reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String>;
}
