//! Built-in tools that ship with the runtime itself, distinct from anything
//! sourced from an MCP server. Modeled on the reference runtime's editor
//! integration tools (`ide.read_file`, `ide.hover`) exercised directly in
//! the literal end-to-end scenarios, plus a status-probe tool (spec §4.F).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use runtime_mcp::client::AuthContext;

use super::{ToolInvocationResult, ToolInvoker, ToolOrigin, ToolSpec};

pub fn builtin_tools() -> Vec<(ToolSpec, Arc<dyn ToolInvoker>)> {
    vec![
        (
            ToolSpec {
                name: "runtime.infer_task_status".into(),
                schema: json!({
                    "type": "object",
                    "properties": {"task_id": {"type": "string"}},
                    "required": ["task_id"],
                }),
                origin: ToolOrigin::Builtin,
            },
            Arc::new(InferTaskStatus) as Arc<dyn ToolInvoker>,
        ),
        (
            ToolSpec {
                name: "ide.read_file".into(),
                schema: json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"],
                }),
                origin: ToolOrigin::Builtin,
            },
            Arc::new(IdeReadFile) as Arc<dyn ToolInvoker>,
        ),
        (
            ToolSpec {
                name: "ide.hover".into(),
                schema: json!({
                    "type": "object",
                    "properties": {
                        "uri": {"type": "string"},
                        "line": {"type": "integer"},
                        "character": {"type": "integer"},
                    },
                    "required": ["uri", "line", "character"],
                }),
                origin: ToolOrigin::Builtin,
            },
            Arc::new(IdeHover) as Arc<dyn ToolInvoker>,
        ),
    ]
}

struct InferTaskStatus;

#[async_trait]
impl ToolInvoker for InferTaskStatus {
    async fn invoke(&self, arguments: Value, _auth: &AuthContext) -> ToolInvocationResult {
        let task_id = arguments.get("task_id").and_then(Value::as_str).unwrap_or("");
        if task_id.is_empty() {
            return ToolInvocationResult::failure("bad arguments: task_id is required");
        }
        ToolInvocationResult::success(format!("status({task_id})=running"))
    }
}

struct IdeReadFile;

#[async_trait]
impl ToolInvoker for IdeReadFile {
    async fn invoke(&self, arguments: Value, _auth: &AuthContext) -> ToolInvocationResult {
        let path = match arguments.get("path").and_then(Value::as_str) {
            Some(p) if !p.is_empty() => p,
            _ => return ToolInvocationResult::failure("bad arguments: path is required"),
        };
        match tokio::fs::read_to_string(path).await {
            Ok(data) => ToolInvocationResult::success(data.chars().take(2000).collect::<String>()),
            Err(e) => ToolInvocationResult::failure(e.to_string()),
        }
    }
}

struct IdeHover;

#[async_trait]
impl ToolInvoker for IdeHover {
    async fn invoke(&self, arguments: Value, _auth: &AuthContext) -> ToolInvocationResult {
        let uri = arguments.get("uri").and_then(Value::as_str).unwrap_or("");
        let line = arguments.get("line").and_then(Value::as_i64);
        let character = arguments.get("character").and_then(Value::as_i64);
        let (line, character) = match (line, character) {
            (Some(l), Some(c)) => (l, c),
            _ => return ToolInvocationResult::failure("bad arguments: line and character are required"),
        };
        ToolInvocationResult::success(format!("hover({uri}:{line}:{character})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn infer_task_status_reports_running() {
        let r = InferTaskStatus
            .invoke(json!({"task_id": "t1"}), &AuthContext::default())
            .await;
        assert!(r.ok);
        assert_eq!(r.text, "status(t1)=running");
    }

    #[tokio::test]
    async fn hover_requires_position() {
        let r = IdeHover.invoke(json!({"uri": "file:///a"}), &AuthContext::default()).await;
        assert!(!r.ok);
    }

    #[tokio::test]
    async fn hover_formats_position() {
        let r = IdeHover
            .invoke(json!({"uri": "file:///a", "line": 1, "character": 2}), &AuthContext::default())
            .await;
        assert!(r.ok);
        assert_eq!(r.text, "hover(file:///a:1:2)");
    }
}
