//! Shared application state.

use std::sync::Arc;

use anyhow::Context;
use orchard_chat::{ChatAssistant, ChatModel, LmStudioClient};
use orchard_rag::ContextProvider;

use crate::config::ServerConfig;

/// State injected into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Retrieval-augmented chat over the shared index.
    pub assistant: ChatAssistant,
}

impl AppState {
    /// Build state around an already opened provider and model.
    pub fn new(provider: Arc<ContextProvider>, model: Arc<dyn ChatModel>) -> Self {
        Self { assistant: ChatAssistant::new(provider, model) }
    }

    /// Open the persisted index and connect to LM Studio as configured.
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let rag_config = config.rag_config().context("invalid retrieval configuration")?;
        let embedding_provider =
            config.embedding_provider().context("failed to create embedding provider")?;
        let provider = ContextProvider::open(rag_config, embedding_provider)
            .await
            .context("failed to open retrieval index")?;
        let model = LmStudioClient::new(config.lm_studio_config())
            .context("failed to create LM Studio client")?;
        Ok(Self::new(Arc::new(provider), Arc::new(model)))
    }

    /// The context provider shared with the assistant.
    pub fn provider(&self) -> &Arc<ContextProvider> {
        self.assistant.provider()
    }
}
