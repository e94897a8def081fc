//! `orchard-server` exposes the retrieval-augmented chat assistant over HTTP.
//!
//! | Route | Body | Reply |
//! |-------|------|-------|
//! | `POST /chat` | `{messages, temperature?, max_tokens?}` | `{response}` |
//! | `POST /upload_documents` | `{documents, metadatas?}` | `{message, chunks}` |
//! | `POST /clear_documents` | | `{message}` |
//! | `POST /context` | `{query, k?}` | `{context}` |
//! | `GET /health` | | `{status, service, chunks}` |
//!
//! Failures reply `{error}` with status 400 for invalid input and 500 otherwise.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use anyhow::Context;
use tracing::{info, warn};

pub use config::{EmbeddingBackend, ServerConfig};
pub use error::ApiError;
pub use routes::app_router;
pub use state::AppState;

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let state = AppState::from_config(&config).await?;
    info!(
        index = %state.provider().index_path().display(),
        chunks = state.provider().len().await,
        embeddings = ?config.embeddings,
        lm_studio = %config.lm_studio_url,
        "retrieval index ready"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("orchard-server listening on http://{}", addr);
    axum::serve(listener, app_router(state)).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!(error = %e, "cannot listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
