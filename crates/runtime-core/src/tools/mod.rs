//! Tool registry (spec §4.F): unions MCP tools with built-ins, exposes
//! name→{schema, invoker}. Collision policy is first-registered-wins.

pub mod builtin;
pub mod dialect;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use runtime_mcp::client::AuthContext;
use runtime_mcp::McpRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOrigin {
    Builtin,
    Mcp(String),
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub schema: Value,
    pub origin: ToolOrigin,
}

#[derive(Debug, Clone)]
pub struct ToolInvocationResult {
    pub ok: bool,
    pub text: String,
    pub error: Option<String>,
}

impl ToolInvocationResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            text: text.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            ok: false,
            text: String::new(),
            error: Some(error),
        }
    }
}

#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, arguments: Value, auth: &AuthContext) -> ToolInvocationResult;
}

/// Unions statically-registered built-in tools with the dynamically
/// discovered MCP catalog.
pub struct ToolRegistry {
    builtins: HashMap<String, (ToolSpec, Arc<dyn ToolInvoker>)>,
    mcp: Arc<McpRegistry>,
    call_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(mcp: Arc<McpRegistry>, call_timeout: Duration) -> Self {
        let mut registry = Self {
            builtins: HashMap::new(),
            mcp,
            call_timeout,
        };
        for (spec, invoker) in builtin::builtin_tools() {
            registry.register(spec, invoker);
        }
        registry
    }

    /// `register(spec, invoker)` — first-wins, later duplicates logged and ignored.
    pub fn register(&mut self, spec: ToolSpec, invoker: Arc<dyn ToolInvoker>) {
        if self.builtins.contains_key(&spec.name) {
            warn!(tool = %spec.name, "duplicate builtin tool registration, ignoring");
            return;
        }
        self.builtins.insert(spec.name.clone(), (spec, invoker));
    }

    /// True if `name` resolves to either a built-in or an MCP-discovered tool.
    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name) || self.mcp.lookup(name).is_some()
    }

    /// All tool names the registry currently knows about, builtins first.
    /// Used as the allow-list for the text-dialect JSON heuristic when the
    /// caller declared no tools of its own.
    pub fn known_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builtins.keys().cloned().collect();
        names.extend(self.mcp.tool_names());
        names
    }

    /// The registry's own schema for a tool, if any (builtins take precedence
    /// over MCP on name collision, matching startup-then-refresh ordering).
    pub fn schema_for(&self, name: &str) -> Option<Value> {
        if let Some((spec, _)) = self.builtins.get(name) {
            return Some(spec.schema.clone());
        }
        self.mcp.lookup(name).map(|t| t.tool.input_schema)
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        auth: &AuthContext,
    ) -> ToolInvocationResult {
        let start = Instant::now();
        let result = if let Some((_, invoker)) = self.builtins.get(name) {
            tokio::time::timeout(self.call_timeout, invoker.invoke(arguments, auth))
                .await
                .unwrap_or_else(|_| ToolInvocationResult::failure("tool call timed out"))
        } else {
            match self.mcp.call(name, arguments, auth).await {
                Ok(outcome) => {
                    if outcome.is_error {
                        ToolInvocationResult::failure(outcome.text())
                    } else {
                        ToolInvocationResult::success(outcome.text())
                    }
                }
                Err(e) => ToolInvocationResult::failure(e.to_string()),
            }
        };
        tracing::debug!(tool = %name, ms = start.elapsed().as_millis() as u64, ok = result.ok, "tool invoked");
        result
    }
}
