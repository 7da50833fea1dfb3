//! `GET /v1/models` (spec §4.A, §6).

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::state::AppState;

#[derive(Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    created: i64,
    owned_by: &'static str,
}

#[derive(Serialize)]
struct ModelsListResponse {
    object: &'static str,
    data: Vec<ModelEntry>,
}

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let ids = state.providers.list_models().await;
    let data: Vec<ModelEntry> = ids
        .into_iter()
        .map(|id| ModelEntry {
            id,
            object: "model",
            created: 0,
            owned_by: "runtime-gateway",
        })
        .collect();
    Json(serde_json::to_value(ModelsListResponse { object: "list", data }).unwrap_or(Value::Null))
}
