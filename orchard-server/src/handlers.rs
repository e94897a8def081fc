//! Request handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use orchard_chat::{ChatMessage, ChatOptions};
use orchard_rag::Metadata;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far; the last message is the one answered.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Overrides [`ChatOptions::temperature`].
    pub temperature: Option<f32>,
    /// Overrides [`ChatOptions::max_tokens`].
    pub max_tokens: Option<u32>,
}

/// Reply to `POST /chat`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The model's answer.
    pub response: String,
}

/// Body of `POST /upload_documents`.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Raw document texts.
    #[serde(default)]
    pub documents: Vec<String>,
    /// One metadata map per document; an empty list means none.
    #[serde(default)]
    pub metadatas: Vec<Metadata>,
}

/// Body of `POST /context`.
#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    pub query: String,
    /// Chunks to retrieve; the configured default when absent.
    pub k: Option<usize>,
}

/// Reply to `POST /context`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContextResponse {
    pub context: String,
}

/// `GET /health`: liveness plus the number of indexed chunks.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let chunks = state.provider().len().await;
    Json(json!({"status": "ok", "service": "orchard-server", "chunks": chunks}))
}

/// `POST /chat`: answer the conversation with retrieved context.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    let defaults = ChatOptions::default();
    let options = ChatOptions {
        temperature: request.temperature.unwrap_or(defaults.temperature),
        max_tokens: request.max_tokens.unwrap_or(defaults.max_tokens),
    };
    let response = state.assistant.chat(&request.messages, &options).await?;
    Ok(Json(ChatResponse { response }))
}

/// `POST /upload_documents`: chunk, embed and index the uploaded documents.
pub async fn upload_documents(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let metadatas = (!request.metadatas.is_empty()).then_some(request.metadatas.as_slice());
    let chunks = state.assistant.add_documents(request.documents.as_slice(), metadatas).await?;
    info!(documents = request.documents.len(), chunks, "documents uploaded");
    Ok(Json(json!({"message": "Documents uploaded successfully", "chunks": chunks})))
}

/// `POST /clear_documents`: drop the index and its snapshot.
pub async fn clear_documents(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.assistant.clear_documents().await?;
    Ok(Json(json!({"message": "Documents cleared successfully"})))
}

/// `POST /context`: the joined context a chat would receive.
pub async fn context(
    State(state): State<AppState>,
    payload: Result<Json<ContextRequest>, JsonRejection>,
) -> Result<Json<ContextResponse>, ApiError> {
    let Json(request) = payload?;
    let context = state.provider().get_relevant_context(&request.query, request.k).await?;
    Ok(Json(ContextResponse { context }))
}
