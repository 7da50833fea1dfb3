//! `POST /internal/refresh_mcp_tools` (spec §4.F, §6): re-runs MCP discovery
//! against every configured server and rebuilds the tool catalog.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::routes::chat::forwarded_auth_context;
use crate::state::AppState;

pub async fn refresh_mcp_tools(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let auth = forwarded_auth_context(&headers);
    let report = state.mcp.refresh(&auth).await;
    Json(json!({
        "ok": true,
        "servers": report.servers,
        "registered": report.registered,
    }))
}
