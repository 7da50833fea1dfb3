//! Tool-call orchestrator (spec §4.G): drives the request/tool-call/backend
//! loop until the backend stops asking for tools, a budget is hit, or the
//! caller cancels. Grounded on the reply loop's step/budget bookkeeping,
//! generalized to a backend-agnostic trait instead of a fixed provider.

pub mod planner;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::RuntimeError;
use crate::message::{Message, ToolCall};
use crate::sampling::SamplingParams;
use crate::tools::{dialect, ToolRegistry};
use crate::trace::{summarize_arguments, Trace, TraceToolCall, TraceToolResult};

use runtime_mcp::client::AuthContext;

pub use planner::{PlannerConfig, PlannerState};

/// One backend-facing turn: the full message history plus the sampling
/// params and declared tools for this call. `tool_specs` entries are
/// `{"name": string, "schema": <json schema>}`, already unwrapped from
/// whatever the client's wire format nested them in.
pub struct BackendRequest<'a> {
    pub model: String,
    pub messages: Vec<Message>,
    pub sampling: SamplingParams,
    pub tool_specs: &'a [Value],
    /// `0` is normalized away by the caller before this is built — a backend
    /// default, not "emit no tokens" (spec §8 boundary behavior).
    pub max_tokens: Option<u32>,
}

pub struct BackendResponse {
    pub message: Message,
    pub finish_reason: String,
}

/// Abstracts over the concrete HTTP provider adapter so the orchestrator
/// loop has no knowledge of llama.cpp/lmdeploy/ollama/mnn wire formats.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: BackendRequest<'_>) -> Result<BackendResponse, RuntimeError>;
}

/// `tools=auto` (default) lets the model decide; `none` disables tool-call
/// detection outright even if the backend emits one; `named` restricts the
/// model (and the text-dialect allow-list) to a single tool (spec §3
/// `ChatRequest.tool_choice`). Unknown-name validation happens at the HTTP
/// layer, where the full declared-tools list is still in scope.
#[derive(Debug, Clone)]
pub enum ToolChoice {
    Auto,
    None,
    Named(String),
}

impl Default for ToolChoice {
    fn default() -> Self {
        ToolChoice::Auto
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_steps: u32,
    pub max_tool_calls: u32,
    pub planner: PlannerConfig,
    pub tool_choice: ToolChoice,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            max_tool_calls: 16,
            planner: PlannerConfig::default(),
            tool_choice: ToolChoice::Auto,
        }
    }
}

pub struct OrchestratorOutcome {
    /// The assistant/tool messages produced this request, in order — append
    /// these to the session turn alongside the caller's own messages.
    pub appended: Vec<Message>,
    pub finish_reason: String,
}

fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    let validator = jsonschema::validator_for(schema).map_err(|e| format!("invalid schema: {e}"))?;
    validator.validate(arguments).map_err(|e| e.to_string())
}

/// Extracts normalized tool calls from a backend turn: native `tool_calls`
/// take precedence; otherwise the text is scanned for a known dialect
/// (spec §4.G detection precedence).
fn extract_tool_calls(message: &Message, allowed: &[String]) -> Vec<ToolCall> {
    if let Some(calls) = &message.tool_calls {
        if !calls.is_empty() {
            return calls.clone();
        }
    }
    dialect::detect_any(&message.text(), allowed)
        .map(|(_, calls)| calls)
        .unwrap_or_default()
}

/// Runs the tool-call loop to completion, calling `backend` for each turn
/// and `registry` for each tool invocation. `seed_messages` is the full
/// hydrated history (prior turns plus the caller's latest turn).
#[allow(clippy::too_many_arguments)]
pub async fn run(
    backend: &dyn ChatBackend,
    registry: &ToolRegistry,
    model: &str,
    mut messages: Vec<Message>,
    sampling: SamplingParams,
    declared_tool_schemas: &[Value],
    max_tokens: Option<u32>,
    auth: &AuthContext,
    config: &OrchestratorConfig,
    trace: &mut Trace,
) -> Result<OrchestratorOutcome, RuntimeError> {
    let allowed_names = declared_allowed_names(declared_tool_schemas, registry);
    let mut appended = Vec::new();
    let mut planner_state = PlannerState::default();
    let mut tool_calls_used: u32 = 0;

    for step in 0..config.max_steps {
        let backend_start = std::time::Instant::now();
        let response = backend
            .complete(BackendRequest {
                model: model.to_string(),
                messages: messages.clone(),
                sampling,
                tool_specs: declared_tool_schemas,
                max_tokens,
            })
            .await?;
        trace.timings.backend_ms += backend_start.elapsed().as_millis() as u64;

        let calls = if matches!(config.tool_choice, ToolChoice::None) {
            Vec::new()
        } else {
            extract_tool_calls(&response.message, &allowed_names)
        };
        if calls.is_empty() {
            appended.push(response.message);
            return Ok(OrchestratorOutcome {
                appended,
                finish_reason: response.finish_reason,
            });
        }

        // spec.md's step-budget boundary: on the last allowed round, a reply
        // that still wants tools is never executed — the orchestrator
        // short-circuits with whatever text the backend gave (or a
        // synthesized "done") and `finish_reason="length"`.
        if step + 1 == config.max_steps {
            let text = response.message.text();
            let last_text = if text.trim().is_empty() { "done".to_string() } else { text };
            appended.push(Message::assistant(last_text));
            return Ok(OrchestratorOutcome {
                appended,
                finish_reason: "length".to_string(),
            });
        }

        if tool_calls_used + calls.len() as u32 > config.max_tool_calls {
            let assistant = Message {
                tool_calls: Some(calls.clone()),
                ..response.message
            };
            appended.push(assistant);
            for call in &calls {
                appended.push(Message::tool_result(
                    &call.id,
                    format!(
                        "TOOL_RESULT {} ok=false error=\"tool call budget exceeded for this request\"",
                        call.name
                    ),
                ));
            }
            return Ok(OrchestratorOutcome {
                appended,
                finish_reason: "tool_limit".to_string(),
            });
        }

        let assistant = Message {
            tool_calls: Some(calls.clone()),
            ..response.message
        };
        messages.push(assistant.clone());
        appended.push(assistant);

        for call in &calls {
            tool_calls_used += 1;
            trace.tool_calls.push(TraceToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                args_summary: summarize_arguments(&call.arguments),
            });

            let start = std::time::Instant::now();
            let result = if !registry.contains(&call.name) {
                crate::tools::ToolInvocationResult::failure("unknown tool")
            } else {
                let arguments = resolve_arguments(
                    backend,
                    registry,
                    model,
                    sampling,
                    call,
                    declared_tool_schemas,
                    config,
                    trace,
                    &mut planner_state,
                )
                .await;

                match arguments {
                    Ok(args) => registry.invoke(&call.name, args, auth).await,
                    Err(reason) => crate::tools::ToolInvocationResult::failure(reason),
                }
            };
            let elapsed_ms = start.elapsed().as_millis() as u64;
            trace.timings.tool_ms += elapsed_ms;

            trace.tool_results.push(TraceToolResult {
                id: call.id.clone(),
                name: call.name.clone(),
                ok: result.ok,
                error: result.error.clone(),
                ms: elapsed_ms,
            });

            // spec §4.G step 3c: the result text always carries a human-readable
            // marker so text-dialect backends can see their own tool calls land.
            let text = if result.ok {
                format!("TOOL_RESULT {} ok=true {}", call.name, result.text)
            } else {
                format!(
                    "TOOL_RESULT {} ok=false error=\"{}\"",
                    call.name,
                    result.error.unwrap_or_else(|| "tool call failed".to_string())
                )
            };
            let tool_msg = Message::tool_result(&call.id, text);
            messages.push(tool_msg.clone());
            appended.push(tool_msg);
        }
    }

    Ok(OrchestratorOutcome {
        appended,
        finish_reason: "length".to_string(),
    })
}

/// Validates a call's arguments against its schema, invoking the planner to
/// rewrite them once (per budget) on failure.
#[allow(clippy::too_many_arguments)]
async fn resolve_arguments(
    backend: &dyn ChatBackend,
    registry: &ToolRegistry,
    model: &str,
    sampling: SamplingParams,
    call: &ToolCall,
    declared_tool_schemas: &[Value],
    config: &OrchestratorConfig,
    trace: &mut Trace,
    planner_state: &mut PlannerState,
) -> Result<Value, String> {
    let schema = declared_tool_schemas
        .iter()
        .find(|s| s.get("name").and_then(Value::as_str) == Some(call.name.as_str()))
        .and_then(|s| s.get("schema").cloned())
        .or_else(|| registry.schema_for(&call.name));

    let Some(schema) = schema else {
        return Ok(call.arguments.clone());
    };

    match validate_arguments(&schema, &call.arguments) {
        Ok(()) => Ok(call.arguments.clone()),
        Err(error) => {
            if !planner_state.can_invoke(&config.planner, &call.id) {
                return Err(format!("bad arguments: {error}"));
            }
            planner_state.plan_steps_used += 1;
            trace.used_planner = true;
            match planner::repair_arguments(
                backend,
                model,
                sampling,
                &call.name,
                &schema,
                &call.arguments,
                &error,
            )
            .await
            {
                Ok(repaired) => match validate_arguments(&schema, &repaired) {
                    Ok(()) => {
                        planner_state.record_rewrite(&call.id);
                        trace.plan_rewrites = planner_state.total_rewrites_used;
                        Ok(repaired)
                    }
                    Err(still_bad) => {
                        warn!(tool = %call.name, error = %still_bad, "planner repair still invalid");
                        Err(format!("bad arguments after repair: {still_bad}"))
                    }
                },
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "planner repair failed");
                    Err(format!("bad arguments: {error}"))
                }
            }
        }
    }
}

fn declared_allowed_names(declared_tool_schemas: &[Value], registry: &ToolRegistry) -> Vec<String> {
    let mut names: Vec<String> = declared_tool_schemas
        .iter()
        .filter_map(|s| s.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();
    if names.is_empty() {
        names = registry.known_names();
    }
    names
}
