//! Discovers tools across configured MCP servers and routes calls to them.
//!
//! Collision policy: first-registered wins; later duplicates are logged and
//! ignored (spec §3 `ToolSpec` invariant, §9 Open Question (b)).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tracing::warn;

use crate::client::{AuthContext, McpClient, McpClientError};
use crate::protocol::{McpTool, ToolCallOutcome};

#[derive(Clone)]
pub struct RegisteredTool {
    pub tool: McpTool,
    pub server: String,
}

pub struct McpRegistry {
    servers: Vec<(String, Arc<McpClient>)>,
    tools: DashMap<String, RegisteredTool>,
    call_timeout: Duration,
}

pub struct RefreshReport {
    pub servers: usize,
    pub registered: usize,
}

impl McpRegistry {
    pub fn new(hosts: &[String], call_timeout: Duration) -> Result<Self, McpClientError> {
        let mut servers = Vec::new();
        for host in hosts {
            let client = McpClient::new(host.clone(), call_timeout)?;
            servers.push((host.clone(), Arc::new(client)));
        }
        Ok(Self {
            servers,
            tools: DashMap::new(),
            call_timeout,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Runs `initialize` then `tools/list` against every configured server,
    /// rebuilding the tool catalog. Later servers advertising an
    /// already-registered name are skipped and a warning is logged.
    pub async fn refresh(&self, auth: &AuthContext) -> RefreshReport {
        self.tools.clear();
        for (host, client) in &self.servers {
            if let Err(e) = client.initialize().await {
                warn!(server = %host, error = %e, "mcp initialize failed");
                continue;
            }
            match client.list_tools(auth).await {
                Ok(tools) => {
                    for tool in tools {
                        if self.tools.contains_key(&tool.name) {
                            warn!(
                                server = %host,
                                tool = %tool.name,
                                "duplicate tool name from another mcp server, ignoring"
                            );
                            continue;
                        }
                        self.tools.insert(
                            tool.name.clone(),
                            RegisteredTool {
                                tool,
                                server: host.clone(),
                            },
                        );
                    }
                }
                Err(e) => {
                    warn!(server = %host, error = %e, "mcp tools/list failed");
                }
            }
        }
        RefreshReport {
            servers: self.servers.len(),
            registered: self.tools.len(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<RegisteredTool> {
        self.tools.get(name).map(|r| r.clone())
    }

    pub fn schemas(&self) -> HashMap<String, Value> {
        self.tools
            .iter()
            .map(|e| (e.key().clone(), e.value().tool.input_schema.clone()))
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|e| e.key().clone()).collect()
    }

    /// Invoke a tool by name against the server that registered it.
    pub async fn call(
        &self,
        name: &str,
        arguments: Value,
        auth: &AuthContext,
    ) -> Result<ToolCallOutcome, McpClientError> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| McpClientError::Rpc {
                code: -32602,
                message: format!("unknown mcp tool: {name}"),
            })?;
        let server = registered.server.clone();
        drop(registered);
        let (_, client) = self
            .servers
            .iter()
            .find(|(host, _)| host == &server)
            .expect("registered tool always has a matching server");
        tokio::time::timeout(self.call_timeout, client.call_tool(name, arguments, auth))
            .await
            .unwrap_or_else(|_| {
                Err(McpClientError::Rpc {
                    code: -32000,
                    message: "mcp tool call timed out".to_string(),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_server(tools_json: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(move |req: &wiremock::Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                let method = body["method"].as_str().unwrap();
                let resp = match method {
                    "initialize" => json!({"jsonrpc": "2.0", "id": body["id"], "result": {}}),
                    "tools/list" => {
                        json!({"jsonrpc": "2.0", "id": body["id"], "result": {"tools": tools_json}})
                    }
                    _ => json!({"jsonrpc": "2.0", "id": body["id"], "error": {"code": -32601, "message": "nope"}}),
                };
                ResponseTemplate::new(200).set_body_json(resp)
            })
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn first_server_wins_on_name_collision() {
        let a = mock_server(json!([{"name": "dup", "inputSchema": {}}])).await;
        let b = mock_server(json!([{"name": "dup", "inputSchema": {}}, {"name": "only_b", "inputSchema": {}}])).await;

        let registry = McpRegistry::new(&[a.uri(), b.uri()], Duration::from_secs(5)).unwrap();
        let report = registry.refresh(&AuthContext::default()).await;
        assert_eq!(report.servers, 2);
        assert_eq!(report.registered, 2);
        assert_eq!(registry.lookup("dup").unwrap().server, a.uri());
        assert!(registry.lookup("only_b").is_some());
    }
}
