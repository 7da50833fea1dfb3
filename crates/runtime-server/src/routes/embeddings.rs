//! `POST /v1/embeddings` (spec §4.A, §6) — routed like chat completions but
//! passed through to the backend verbatim; the gateway has no opinion about
//! embedding vectors themselves.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::routes::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EmbeddingsRequest {
    pub model: String,
    #[serde(flatten)]
    pub rest: Value,
}

pub async fn embeddings(
    State(state): State<AppState>,
    Json(request): Json<EmbeddingsRequest>,
) -> Result<Json<Value>, ApiError> {
    let (provider_name, bare_model) = state.providers.parse_model(&request.model);
    let backend = state.providers.backend(&provider_name)?;

    let mut body = request.rest;
    if let Value::Object(map) = &mut body {
        map.insert("model".to_string(), Value::String(bare_model.to_string()));
    }

    let response = backend.embeddings(body).await?;
    Ok(Json(response))
}
