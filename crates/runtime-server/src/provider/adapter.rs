//! Generic OpenAI-compatible backend adapter. Every supported engine
//! (llama.cpp, lmdeploy, ollama, mnn) is treated as a black-box peer
//! speaking this same wire format (spec §1 Non-goals, §4.A); only the base
//! URL differs per provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use runtime_core::error::RuntimeError;
use runtime_core::message::{Content, Message, Role, ToolCall};
use runtime_core::orchestrator::{BackendRequest, BackendResponse, ChatBackend};

pub struct OpenAiCompatBackend {
    http: reqwest::Client,
    base_url: String,
    provider_name: String,
}

impl OpenAiCompatBackend {
    pub fn new(provider_name: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client builds"),
            base_url: base_url.into(),
            provider_name: provider_name.into(),
        }
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> RuntimeError {
        RuntimeError::ProviderUnavailable {
            provider: self.provider_name.clone(),
            reason: reason.to_string(),
        }
    }

    /// `GET /v1/models`, returning the backend's own model ids unprefixed.
    pub async fn list_models(&self) -> Result<Vec<String>, RuntimeError> {
        let url = format!("{}/v1/models", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;
        if !resp.status().is_success() {
            return Err(self.unavailable(format!("GET /v1/models returned {}", resp.status())));
        }
        let body: ModelsListResponse = resp.json().await.map_err(|e| self.unavailable(e))?;
        Ok(body.data.into_iter().map(|m| m.id).collect())
    }

    /// `POST /v1/embeddings`, passed through verbatim.
    pub async fn embeddings(&self, body: Value) -> Result<Value, RuntimeError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;
        if !resp.status().is_success() {
            return Err(self.unavailable(format!("POST /v1/embeddings returned {}", resp.status())));
        }
        resp.json().await.map_err(|e| self.unavailable(e))
    }
}

#[derive(Deserialize)]
struct ModelsListResponse {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "default_function_type")]
    kind: String,
    function: WireFunctionCall,
}

fn default_function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction,
}

#[derive(Serialize)]
struct WireToolFunction {
    name: String,
    parameters: Value,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f64,
    top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize)]
struct ChatCompletionChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn to_wire_message(message: &Message) -> WireMessage {
    WireMessage {
        role: role_str(message.role),
        content: message.text(),
        tool_calls: message.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    kind: "function".to_string(),
                    function: WireFunctionCall {
                        name: c.name.clone(),
                        arguments: c.arguments.to_string(),
                    },
                })
                .collect()
        }),
        tool_call_id: message.tool_call_id.clone(),
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    async fn complete(&self, request: BackendRequest<'_>) -> Result<BackendResponse, RuntimeError> {
        let tools = request
            .tool_specs
            .iter()
            .filter_map(|s| {
                let name = s.get("name")?.as_str()?.to_string();
                let parameters = s.get("schema").cloned().unwrap_or(Value::Null);
                Some(WireTool {
                    kind: "function",
                    function: WireToolFunction { name, parameters },
                })
            })
            .collect();

        let body = ChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(to_wire_message).collect(),
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            min_p: request.sampling.min_p,
            max_tokens: request.max_tokens,
            tools,
        };

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RuntimeError::UpstreamTimeout(Duration::from_secs(0))
                } else {
                    self.unavailable(e)
                }
            })?;

        if !resp.status().is_success() {
            return Err(self.unavailable(format!(
                "POST /v1/chat/completions returned {}",
                resp.status()
            )));
        }

        let parsed: ChatCompletionResponse = resp.json().await.map_err(|e| self.unavailable(e))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| self.unavailable("backend returned no choices"))?;

        let tool_calls = choice.message.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|c| ToolCall {
                    id: c.id,
                    name: c.function.name,
                    arguments: serde_json::from_str(&c.function.arguments)
                        .unwrap_or_else(|_| Value::Object(Default::default())),
                })
                .collect()
        });

        Ok(BackendResponse {
            message: Message {
                role: Role::Assistant,
                content: Content::Text(choice.message.content.unwrap_or_default()),
                tool_calls,
                tool_call_id: None,
            },
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }
}
