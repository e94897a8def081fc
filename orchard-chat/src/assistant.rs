//! Retrieval-augmented chat.
//!
//! [`ChatAssistant`] looks up context for the newest message, injects it as a
//! system message right before that message, and forwards the conversation to
//! a [`ChatModel`].

use std::sync::Arc;

use orchard_rag::{ContextProvider, Metadata};
use tracing::{debug, info};

use crate::error::{ChatError, Result};
use crate::message::{ChatMessage, ChatOptions};
use crate::model::ChatModel;

/// Build the system message carrying retrieved context.
pub fn context_message(context: &str) -> ChatMessage {
    ChatMessage::system(format!(
        "Use the following relevant information to help answer the user's question:\n\n\
         {context}\n\nIf the context is not relevant to the question, you can ignore it."
    ))
}

/// Couples a [`ContextProvider`] with a [`ChatModel`].
///
/// # Example
///
/// ```rust,ignore
/// let assistant = ChatAssistant::new(Arc::new(provider), Arc::new(LmStudioClient::new(config)?));
/// let reply = assistant.chat(&[ChatMessage::user("Which fruit has potassium?")], &ChatOptions::default()).await?;
/// ```
#[derive(Clone)]
pub struct ChatAssistant {
    provider: Arc<ContextProvider>,
    model: Arc<dyn ChatModel>,
}

impl ChatAssistant {
    /// Create an assistant that retrieves from `provider` and answers with `model`.
    pub fn new(provider: Arc<ContextProvider>, model: Arc<dyn ChatModel>) -> Self {
        Self { provider, model }
    }

    /// The context provider backing retrieval.
    pub fn provider(&self) -> &Arc<ContextProvider> {
        &self.provider
    }

    /// The conversation actually sent to the model: `messages` with a context
    /// message inserted before the last one when any context is found.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::EmptyConversation`] for an empty `messages` and
    /// [`ChatError::Rag`] if context retrieval fails.
    pub async fn augment(&self, messages: &[ChatMessage]) -> Result<Vec<ChatMessage>> {
        let Some((last, earlier)) = messages.split_last() else {
            return Err(ChatError::EmptyConversation);
        };

        let context = self.provider.get_relevant_context(&last.content, None).await?;
        let mut augmented = Vec::with_capacity(messages.len() + 1);
        augmented.extend_from_slice(earlier);
        if context.is_empty() {
            debug!("no relevant context, sending conversation unchanged");
        } else {
            debug!(context_len = context.len(), "injecting retrieved context");
            augmented.push(context_message(&context));
        }
        augmented.push(last.clone());
        Ok(augmented)
    }

    /// Reply to the conversation using retrieved context.
    ///
    /// # Errors
    ///
    /// See [`augment`](ChatAssistant::augment); model failures are returned
    /// unchanged.
    pub async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        let augmented = self.augment(messages).await?;
        let reply = self.model.complete(&augmented, options).await?;
        info!(
            message_count = messages.len(),
            with_context = augmented.len() > messages.len(),
            reply_len = reply.len(),
            "chat completed"
        );
        Ok(reply)
    }

    /// Add documents to the retrieval index. Returns the number of chunks added.
    pub async fn add_documents<S: AsRef<str>>(
        &self,
        documents: &[S],
        metadatas: Option<&[Metadata]>,
    ) -> Result<usize> {
        Ok(self.provider.add_documents(documents, metadatas).await?)
    }

    /// Remove every document from the retrieval index.
    pub async fn clear_documents(&self) -> Result<()> {
        Ok(self.provider.clear_database().await?)
    }
}
