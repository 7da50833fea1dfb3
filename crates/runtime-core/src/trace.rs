//! Per-request observability record (spec §3 Trace, §4.J).

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TraceToolCall {
    pub id: String,
    pub name: String,
    pub args_summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceToolResult {
    pub id: String,
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub ms: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TraceTimings {
    pub backend_ms: u64,
    pub tool_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub model: String,
    pub provider: String,
    pub used_planner: bool,
    pub plan_rewrites: u32,
    pub tool_calls: Vec<TraceToolCall>,
    pub tool_results: Vec<TraceToolResult>,
    pub timings: TraceTimings,
}

impl Trace {
    pub fn new(model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider: provider.into(),
            used_planner: false,
            plan_rewrites: 0,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            timings: TraceTimings::default(),
        }
    }

    /// Single-line JSON for the `x-runtime-trace` header, or an SSE side event.
    pub fn to_header_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Summarizes tool-call arguments for the trace without leaking full payloads
/// into logs indefinitely — truncated, not redacted (spec names no secrets here).
pub fn summarize_arguments(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", &s[..200])
    } else {
        s
    }
}
