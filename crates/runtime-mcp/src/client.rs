//! HTTP transport for MCP's JSON-RPC 2.0 dialect.
//!
//! One request, one response, no persistent connection — matches the
//! reference mock server (`tools/mock_mcp_server.py`), which is a plain
//! `POST /` handler with no session/keep-alive semantics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::protocol::{JsonRpcRequest, JsonRpcResponse, ToolCallOutcome, ToolsListResult};

/// The caller-supplied auth headers forwarded verbatim to MCP servers (spec §4.E).
pub const FORWARDED_AUTH_HEADERS: &[&str] =
    &["authorization", "api-key", "x-api-key", "api_key"];

#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    headers: Vec<(String, String)>,
}

impl AuthContext {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            headers: pairs.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Error)]
pub enum McpClientError {
    #[error("mcp transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mcp server returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("mcp response missing result")]
    MissingResult,
    #[error("mcp response malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A client bound to a single MCP server's HTTP endpoint.
pub struct McpClient {
    http: Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl McpClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, McpClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn call(
        &self,
        method: &'static str,
        params: Value,
        auth: &AuthContext,
    ) -> Result<Value, McpClientError> {
        let req = JsonRpcRequest::new(self.next_request_id(), method, params);
        let mut builder = self.http.post(&self.endpoint).json(&req);
        for (k, v) in auth.iter() {
            builder = builder.header(k, v);
        }
        let resp = builder.send().await?.error_for_status()?;
        let body: JsonRpcResponse = resp.json().await?;
        if let Some(err) = body.error {
            return Err(McpClientError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result.ok_or(McpClientError::MissingResult)
    }

    /// `initialize` — negotiate capabilities. The result is opaque to us; we
    /// only need the round trip to succeed.
    pub async fn initialize(&self) -> Result<Value, McpClientError> {
        self.call(
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "runtime-gateway", "version": env!("CARGO_PKG_VERSION")},
            }),
            &AuthContext::default(),
        )
        .await
    }

    /// `tools/list` — the tool catalog.
    pub async fn list_tools(&self, auth: &AuthContext) -> Result<Vec<crate::protocol::McpTool>, McpClientError> {
        let result = self.call("tools/list", json!({}), auth).await?;
        let parsed: ToolsListResult = serde_json::from_value(result)?;
        Ok(parsed.tools)
    }

    /// `tools/call {name, arguments}`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        auth: &AuthContext,
    ) -> Result<ToolCallOutcome, McpClientError> {
        let result = self
            .call("tools/call", json!({"name": name, "arguments": arguments}), auth)
            .await?;
        let parsed: ToolCallOutcome = serde_json::from_value(result)?;
        Ok(parsed)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn list_tools_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"tools": [{"name": "fs.read_file", "inputSchema": {"type": "object"}}]},
            })))
            .mount(&server)
            .await;

        let client = McpClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let tools = client.list_tools(&AuthContext::default()).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "fs.read_file");
    }

    #[tokio::test]
    async fn rpc_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32601, "message": "method not found"},
            })))
            .mount(&server)
            .await;

        let client = McpClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.list_tools(&AuthContext::default()).await.unwrap_err();
        assert!(matches!(err, McpClientError::Rpc { code: -32601, .. }));
    }

    #[tokio::test]
    async fn auth_headers_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(wiremock::matchers::header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"content": [{"type": "text", "text": "ok"}], "isError": false},
            })))
            .mount(&server)
            .await;

        let client = McpClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let auth = AuthContext::from_pairs([("x-api-key".to_string(), "secret".to_string())]);
        let outcome = client.call_tool("t", json!({}), &auth).await.unwrap();
        assert_eq!(outcome.text(), "ok");
    }
}
