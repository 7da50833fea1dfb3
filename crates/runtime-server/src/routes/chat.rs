//! `POST /v1/chat/completions` (spec §4.A, §4.C, §4.G).
//!
//! Hydrates session history, normalizes sampling, runs the tool-call
//! orchestrator to completion, then answers either as a single JSON body or
//! as an SSE stream of `data: {...}\n\n` frames ending in `data: [DONE]`.
//! Internal backend turns are always non-streaming (the reference engines
//! this gateway fronts have no streaming mode of their own); when the
//! client asked for `stream: true` the final answer is chunked into SSE
//! frames here rather than proxied chunk-for-chunk from upstream.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use runtime_core::message::{validate_role_sequence, Message};
use runtime_core::orchestrator::{self, OrchestratorConfig, PlannerConfig, ToolChoice};
use runtime_core::sampling::{self, RequestedSampling};
use runtime_core::session::Turn;
use runtime_core::trace::Trace;

use runtime_mcp::client::AuthContext;

use crate::provider::adapter::OpenAiCompatBackend;
use crate::routes::errors::ApiError;
use crate::sse::{frame, SseResponse, DONE_FRAME};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub min_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub max_steps: Option<u32>,
    #[serde(default)]
    pub max_tool_calls: Option<u32>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub use_server_history: bool,
    #[serde(default)]
    pub trace: bool,
    #[serde(default)]
    pub planner: Option<PlannerOverride>,
}

/// Parses the OpenAI-shaped `tool_choice` (`"auto"` | `"none"` |
/// `{"type":"function","function":{"name"}}`) into the orchestrator's
/// `ToolChoice`, rejecting a named choice that isn't among the request's own
/// declared tools (spec §3 `ChatRequest.tool_choice`, §8 boundary behavior).
fn parse_tool_choice(value: &Value, declared_tools: &[Value]) -> Result<ToolChoice, ApiError> {
    if let Some(s) = value.as_str() {
        return match s {
            "auto" => Ok(ToolChoice::Auto),
            "none" => Ok(ToolChoice::None),
            other => Err(ApiError::bad_request(format!("unknown tool_choice {other:?}"))),
        };
    }
    let name = value
        .get("function")
        .and_then(|f| f.get("name"))
        .or_else(|| value.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("tool_choice must be \"auto\", \"none\", or a named tool"))?;
    let known = declared_tools
        .iter()
        .any(|t| t.get("name").and_then(Value::as_str) == Some(name));
    if !known {
        return Err(ApiError::bad_request(format!(
            "tool_choice names unknown tool {name:?}"
        )));
    }
    Ok(ToolChoice::Named(name.to_string()))
}

#[derive(Debug, Deserialize, Default)]
pub struct PlannerOverride {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub max_plan_steps: u32,
    #[serde(default)]
    pub max_rewrites: u32,
}

#[derive(Debug, Serialize)]
struct ChatCompletionResponse {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<ChoiceOut>,
    usage: UsageOut,
}

#[derive(Debug, Serialize)]
struct ChoiceOut {
    index: u32,
    message: Message,
    finish_reason: String,
}

#[derive(Debug, Serialize, Default)]
struct UsageOut {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

/// Unwraps the client's OpenAI-shaped `tools` declarations
/// (`{"type":"function","function":{"name","parameters"}}`) into the
/// orchestrator's plain `{"name","schema"}` shape.
fn normalize_declared_tools(tools: &[Value]) -> Vec<Value> {
    tools
        .iter()
        .filter_map(|t| {
            let function = t.get("function").unwrap_or(t);
            let name = function.get("name")?.as_str()?.to_string();
            let schema = function
                .get("parameters")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object"}));
            Some(json!({"name": name, "schema": schema}))
        })
        .collect()
}

pub fn forwarded_auth_context(headers: &HeaderMap) -> AuthContext {
    let pairs: Vec<(String, String)> = runtime_mcp::client::FORWARDED_AUTH_HEADERS
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect();
    AuthContext::from_pairs(pairs)
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    if request.messages.is_empty() {
        return Err(ApiError::bad_request("messages must not be empty"));
    }
    validate_role_sequence(&request.messages).map_err(ApiError::bad_request)?;

    let (provider_name, bare_model) = state.providers.parse_model(&request.model);
    let backend: std::sync::Arc<OpenAiCompatBackend> = state.providers.backend(&provider_name)?;

    // Every request belongs to a session: the header takes precedence over a
    // body-supplied id, and a fresh one is minted when neither is present.
    // `use_server_history` is accepted for wire compatibility with older
    // clients but hydration itself is unconditional whenever a session
    // already exists — the field no longer gates anything server-side.
    let _ = request.use_server_history;
    let session_id = headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.session_id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let namespace = state.config.session_store.namespace.clone();

    let mut history = Vec::new();
    if let Some(session) = state.sessions.get(&namespace, &session_id).await? {
        history = session.history();
    }

    let mut full_messages = history;
    full_messages.extend(request.messages.clone());

    let sampling = sampling::normalize(
        &request.model,
        RequestedSampling {
            temperature: request.temperature,
            top_p: request.top_p,
            min_p: request.min_p,
        },
    );

    let declared_tools = normalize_declared_tools(&request.tools);
    let auth = forwarded_auth_context(&headers);

    // A literal `max_tokens: 0` means "no override," not "emit zero tokens"
    // (spec §8 boundary behavior).
    let max_tokens = request.max_tokens.filter(|&v| v > 0);

    let planner = request
        .planner
        .as_ref()
        .map(|p| PlannerConfig {
            enabled: p.enabled,
            max_plan_steps: p.max_plan_steps,
            max_rewrites: p.max_rewrites,
        })
        .unwrap_or_default();
    let tool_choice = request
        .tool_choice
        .as_ref()
        .map(|v| parse_tool_choice(v, &declared_tools))
        .transpose()?
        .unwrap_or_default();
    let orchestrator_config = OrchestratorConfig {
        planner,
        tool_choice,
        max_steps: request.max_steps.unwrap_or(state.orchestrator.max_steps),
        max_tool_calls: request.max_tool_calls.unwrap_or(state.orchestrator.max_tool_calls),
    };

    let mut trace = Trace::new(bare_model, provider_name.clone());

    let registry = state.tools.read().await;
    let _guard = state.session_locks.acquire(&namespace, &session_id).await?;

    let orchestrator_start = std::time::Instant::now();
    let outcome = orchestrator::run(
        backend.as_ref(),
        &registry,
        &request.model,
        full_messages,
        sampling,
        &declared_tools,
        max_tokens,
        &auth,
        &orchestrator_config,
        &mut trace,
    )
    .await?;
    trace.timings.total_ms = orchestrator_start.elapsed().as_millis() as u64;
    drop(registry);

    let mut turn_messages = request.messages.clone();
    turn_messages.extend(outcome.appended.clone());
    state
        .sessions
        .append_turn(&namespace, &session_id, Turn { messages: turn_messages }, now_unix())
        .await?;

    let final_message = outcome
        .appended
        .iter()
        .rev()
        .find(|m| matches!(m.role, runtime_core::message::Role::Assistant))
        .cloned()
        .unwrap_or_else(|| Message::assistant(""));

    let body = ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        object: "chat.completion",
        created: now_unix(),
        model: request.model.clone(),
        choices: vec![ChoiceOut {
            index: 0,
            message: final_message.clone(),
            finish_reason: outcome.finish_reason.clone(),
        }],
        usage: UsageOut::default(),
    };

    let mut response = if request.stream {
        stream_response(&outcome.appended, &outcome.finish_reason, &request.model).into_response()
    } else {
        Json(body).into_response()
    };

    if let Ok(value) = axum::http::HeaderValue::from_str(&session_id) {
        response.headers_mut().insert("x-session-id", value);
    }
    if request.trace {
        if let Ok(value) = axum::http::HeaderValue::from_str(&trace.to_header_json()) {
            response.headers_mut().insert("x-runtime-trace", value);
        }
    }

    Ok(response)
}

/// Streams one frame per backend turn's content and per tool call/result as
/// the orchestrator produced them, rather than a single synthesized final
/// chunk (spec §4.G "Streaming semantics") — `appended` is already in the
/// order the loop emitted it, so replaying it here preserves turn order.
fn stream_response(appended: &[Message], finish_reason: &str, model: &str) -> SseResponse {
    let (tx, rx) = mpsc::channel(8);
    let completion_id = format!("chatcmpl-{}", Uuid::new_v4().simple());
    let appended = appended.to_vec();
    let model = model.to_string();
    let finish_reason = finish_reason.to_string();
    tokio::spawn(async move {
        for message in &appended {
            let delta = match message.role {
                runtime_core::message::Role::Assistant => {
                    let text = message.text();
                    let tool_calls = message.tool_calls.as_ref().map(|calls| {
                        calls
                            .iter()
                            .enumerate()
                            .map(|(i, c)| {
                                json!({
                                    "index": i,
                                    "id": c.id,
                                    "type": "function",
                                    "function": {"name": c.name, "arguments": c.arguments.to_string()},
                                })
                            })
                            .collect::<Vec<_>>()
                    });
                    match tool_calls {
                        Some(calls) => json!({"role": "assistant", "tool_calls": calls}),
                        None => json!({"role": "assistant", "content": text}),
                    }
                }
                runtime_core::message::Role::Tool => json!({
                    "role": "tool",
                    "tool_call_id": message.tool_call_id,
                    "tool_result": message.text(),
                }),
                _ => continue,
            };
            let chunk = json!({
                "id": completion_id,
                "object": "chat.completion.chunk",
                "model": model,
                "choices": [{"index": 0, "delta": delta, "finish_reason": Value::Null}],
            });
            if tx.send(frame(&chunk.to_string())).await.is_err() {
                return;
            }
        }

        let finish = json!({
            "id": completion_id,
            "object": "chat.completion.chunk",
            "model": model,
            "choices": [{"index": 0, "delta": {}, "finish_reason": finish_reason}],
        });
        let _ = tx.send(frame(&finish.to_string())).await;
        let _ = tx.send(DONE_FRAME.to_string()).await;
    });
    SseResponse::new(rx)
}
