//! Text-dialect detection for tool calls embedded in assistant content
//! (spec §4.G "Text-dialect detection").
//!
//! Backends without native `tool_calls` support encode calls inside plain
//! text using one of several dialects. Each matcher is independent and
//! returns `Option<Vec<NormalizedToolCall>>`; the first match in
//! `detect_any` wins, so a new dialect plugs in without touching the
//! orchestrator loop. Precedence: tag dialects (in listed order) before the
//! JSON-object heuristic.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::message::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `<tool_call>{"name":...,"arguments":{...}}</tool_call>`
    Tag,
    /// `[[tool_call name="x"]]{...}[[/tool_call]]`
    WeirdTag,
    /// a fenced ` ```tool_call\n{...}\n``` ` block, as emitted by terminal coding agents.
    Opencode,
    /// a bare `{"name":...,"arguments":{...}}` object whose name is in the allowed set.
    JsonHeuristic,
}

fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

fn call_from_value(v: &Value) -> Option<ToolCall> {
    let name = v.get("name").and_then(Value::as_str)?.to_string();
    let arguments = v
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    Some(ToolCall {
        id: new_call_id(),
        name,
        arguments,
    })
}

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<tool_call>\s*(\{.*?\})\s*</tool_call>").unwrap());

fn detect_tag(text: &str) -> Option<Vec<ToolCall>> {
    let calls: Vec<ToolCall> = TAG_RE
        .captures_iter(text)
        .filter_map(|c| serde_json::from_str::<Value>(&c[1]).ok())
        .filter_map(|v| call_from_value(&v))
        .collect();
    (!calls.is_empty()).then_some(calls)
}

static WEIRD_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)\[\[tool_call name="([^"]+)"\]\]\s*(\{.*?\})\s*\[\[/tool_call\]\]"#).unwrap());

fn detect_weird_tag(text: &str) -> Option<Vec<ToolCall>> {
    let calls: Vec<ToolCall> = WEIRD_TAG_RE
        .captures_iter(text)
        .filter_map(|c| {
            let name = c[1].to_string();
            let arguments = serde_json::from_str::<Value>(&c[2]).ok()?;
            Some(ToolCall {
                id: new_call_id(),
                name,
                arguments,
            })
        })
        .collect();
    (!calls.is_empty()).then_some(calls)
}

static OPENCODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```tool_call\s*\n(\{.*?\})\s*\n```").unwrap());

fn detect_opencode(text: &str) -> Option<Vec<ToolCall>> {
    let calls: Vec<ToolCall> = OPENCODE_RE
        .captures_iter(text)
        .filter_map(|c| serde_json::from_str::<Value>(&c[1]).ok())
        .filter_map(|v| call_from_value(&v))
        .collect();
    (!calls.is_empty()).then_some(calls)
}

static JSON_OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{[^{}]*\}").unwrap());

/// Last-resort heuristic: scan for a bare JSON object naming an allowed tool.
/// Only fires when `allowed` is non-empty, to avoid false-positives on
/// ordinary JSON the assistant might legitimately print.
fn detect_json_heuristic(text: &str, allowed: &[String]) -> Option<Vec<ToolCall>> {
    if allowed.is_empty() {
        return None;
    }
    for m in JSON_OBJECT_RE.find_iter(text) {
        if let Ok(v) = serde_json::from_str::<Value>(m.as_str()) {
            if let Some(name) = v.get("name").and_then(Value::as_str) {
                if allowed.iter().any(|a| a == name) {
                    if let Some(call) = call_from_value(&v) {
                        return Some(vec![call]);
                    }
                }
            }
        }
    }
    None
}

/// Runs every matcher in precedence order and returns the first hit along
/// with which dialect produced it (recorded in the trace).
pub fn detect_any(text: &str, allowed: &[String]) -> Option<(Dialect, Vec<ToolCall>)> {
    if let Some(calls) = detect_tag(text) {
        return Some((Dialect::Tag, calls));
    }
    if let Some(calls) = detect_weird_tag(text) {
        return Some((Dialect::WeirdTag, calls));
    }
    if let Some(calls) = detect_opencode(text) {
        return Some((Dialect::Opencode, calls));
    }
    if let Some(calls) = detect_json_heuristic(text, allowed) {
        return Some((Dialect::JsonHeuristic, calls));
    }
    None
}
