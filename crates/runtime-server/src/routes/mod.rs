pub mod chat;
pub mod embeddings;
pub mod errors;
pub mod internal;
pub mod models;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/models", get(models::list_models))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/embeddings", post(embeddings::embeddings))
        .route("/internal/refresh_mcp_tools", post(internal::refresh_mcp_tools))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
