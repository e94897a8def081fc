//! Client for LM Studio's OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{ChatError, Result};
use crate::message::{ChatMessage, ChatOptions};
use crate::model::ChatModel;

/// Default LM Studio API root.
pub const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1";

/// Connection settings for an LM Studio server.
#[derive(Debug, Clone)]
pub struct LmStudioConfig {
    /// API root, e.g. `http://localhost:1234/v1`.
    pub base_url: String,
    /// Model to request. LM Studio answers with the loaded model when unset.
    pub model: Option<String>,
    /// Bearer token for servers that require one.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for LmStudioConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
            api_key: None,
            timeout: Duration::from_secs(120),
        }
    }
}

impl LmStudioConfig {
    /// Settings for the server at `base_url`, with default timeout and no model or key.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Default::default() }
    }

    /// Request a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Send `Authorization: Bearer <api_key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`ChatModel`] that calls `{base_url}/chat/completions` without streaming.
///
/// # Example
///
/// ```rust,ignore
/// use orchard_chat::{ChatMessage, ChatModel, ChatOptions, LmStudioClient, LmStudioConfig};
///
/// let client = LmStudioClient::new(LmStudioConfig::default())?;
/// let reply = client.complete(&[ChatMessage::user("Hello")], &ChatOptions::default()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct LmStudioClient {
    client: reqwest::Client,
    endpoint: String,
    model: Option<String>,
    api_key: Option<String>,
}

impl LmStudioClient {
    /// Create a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Request`] if the HTTP client cannot be built.
    pub fn new(config: LmStudioConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/');
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{base_url}/chat/completions"),
            model: config.model,
            api_key: config.api_key,
        })
    }

    /// Full URL of the completions endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// ── API request/response types ─────────────────────────────────────

#[derive(Serialize)]
struct CompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message { message: String },
    Text(String),
}

// ── ChatModel implementation ───────────────────────────────────────

#[async_trait]
impl ChatModel for LmStudioClient {
    async fn complete(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        debug!(
            endpoint = %self.endpoint,
            message_count = messages.len(),
            temperature = options.temperature,
            max_tokens = options.max_tokens,
            "requesting chat completion"
        );

        let body = CompletionRequest {
            model: self.model.as_deref(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(endpoint = %self.endpoint, error = %e, "chat request failed");
            ChatError::Request(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(ErrorResponse { error: ErrorDetail::Message { message } }) => message,
                Ok(ErrorResponse { error: ErrorDetail::Text(message) }) => message,
                Err(_) => text,
            };
            error!(%status, "chat completion API error");
            return Err(ChatError::Api { status: status.as_u16(), message });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::InvalidResponse(format!("failed to parse response: {e}")))?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ChatError::InvalidResponse("response has no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    use super::*;

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn spawn_fake(status: StatusCode, reply: Value) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(move |State(captured): State<Captured>, Json(body): Json<Value>| {
                    let reply = reply.clone();
                    async move {
                        captured.lock().unwrap().push(body);
                        (status, Json(reply))
                    }
                }),
            )
            .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/v1"), captured)
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let reply = json!({"choices": [{"message": {"role": "assistant", "content": "Bananas!"}}]});
        let (base, captured) = spawn_fake(StatusCode::OK, reply).await;
        let client = LmStudioClient::new(LmStudioConfig::new(base)).unwrap();

        let options = ChatOptions { temperature: 0.2, max_tokens: 64 };
        let answer = client.complete(&[ChatMessage::user("fruit?")], &options).await.unwrap();
        assert_eq!(answer, "Bananas!");

        let sent = captured.lock().unwrap()[0].clone();
        assert_eq!(sent["stream"], json!(false));
        assert_eq!(sent["max_tokens"], json!(64));
        assert_eq!(sent["messages"], json!([{"role": "user", "content": "fruit?"}]));
        assert!(sent.get("model").is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_an_api_error() {
        let reply = json!({"error": {"message": "no model loaded"}});
        let (base, _) = spawn_fake(StatusCode::BAD_REQUEST, reply).await;
        let client = LmStudioClient::new(LmStudioConfig::new(base)).unwrap();

        let err = client.complete(&[ChatMessage::user("hi")], &ChatOptions::default()).await;
        match err {
            Err(ChatError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "no model loaded");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_choices_is_invalid() {
        let (base, _) = spawn_fake(StatusCode::OK, json!({"choices": []})).await;
        let client = LmStudioClient::new(LmStudioConfig::new(base)).unwrap();
        let err = client.complete(&[ChatMessage::user("hi")], &ChatOptions::default()).await;
        assert!(matches!(err, Err(ChatError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_request_error() {
        let config =
            LmStudioConfig::new("http://127.0.0.1:9/v1").with_timeout(Duration::from_millis(500));
        let client = LmStudioClient::new(config).unwrap();
        let err = client.complete(&[ChatMessage::user("hi")], &ChatOptions::default()).await;
        assert!(matches!(err, Err(ChatError::Request(_))));
    }

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let client = LmStudioClient::new(LmStudioConfig::new("http://host:1234/v1/")).unwrap();
        assert_eq!(client.endpoint(), "http://host:1234/v1/chat/completions");
    }
}
