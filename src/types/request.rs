//! Inbound request types for the OpenAI-compatible chat surface.
//!
//! Only the fields the router actually inspects are typed; everything the
//! gateway merely forwards (`tools`, `tool_choice`, `response_format`,
//! `stop`) stays a [`serde_json::Value`] tree. Upstreams disagree on the
//! shapes of those fields, and the gateway has no business validating them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single chat message.
///
/// `content` is serialized even when null: assistant messages that carry
/// tool calls have no content, and upstreams expect the explicit null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            name: None,
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            name: None,
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Build an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            name: None,
            content: Some(content.into()),
            tool_calls: None,
        }
    }
}

/// A tool invocation requested by the model.
///
/// `function` is an open mapping (`name`, `arguments`, whatever else the
/// upstream emits) — passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
    #[serde(default)]
    pub function: Value,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// A normalized chat-completion request.
///
/// `model` may be `""`/`"auto"` (route anywhere), a bare model name, or
/// `"<provider>:<model>"` to pin a provider. The remaining OpenAI-compatible
/// parameters are forwarded to the selected adapter verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,

    /// Request JSON-strict output. Overrides any client `response_format`.
    #[serde(default)]
    pub json: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    #[serde(default)]
    pub stream: bool,

    // OpenAI-compatible optional parameters, passed through when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u32>,
}

impl ChatRequest {
    /// Minimal request for the given model and messages.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            json: false,
            tools: None,
            tool_choice: None,
            stream: false,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            seed: None,
            response_format: None,
            n: None,
            stop: None,
            logprobs: None,
            top_logprobs: None,
        }
    }

    /// Whether the request demands JSON-strict output, either through the
    /// `json` flag or a `response_format` of type `json_object`.
    pub fn requires_json(&self) -> bool {
        if self.json {
            return true;
        }
        self.response_format
            .as_ref()
            .and_then(|rf| rf.get("type"))
            .and_then(Value::as_str)
            == Some("json_object")
    }

    /// Whether the request carries tool definitions.
    pub fn requires_tools(&self) -> bool {
        self.tools.is_some()
    }

    /// Whether the client asked for a streamed response.
    pub fn requires_stream(&self) -> bool {
        self.stream
    }

    /// All message contents joined with newlines, for prompt-size estimation.
    pub fn joined_content(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_implies_json_requirement() {
        let mut req = ChatRequest::new("auto", vec![ChatMessage::user("hi")]);
        assert!(!req.requires_json());
        req.json = true;
        assert!(req.requires_json());
    }

    #[test]
    fn response_format_json_object_implies_json_requirement() {
        let mut req = ChatRequest::new("auto", vec![ChatMessage::user("hi")]);
        req.response_format = Some(serde_json::json!({"type": "json_object"}));
        assert!(req.requires_json());

        req.response_format = Some(serde_json::json!({"type": "text"}));
        assert!(!req.requires_json());
    }

    #[test]
    fn tools_presence_implies_tools_requirement() {
        let mut req = ChatRequest::new("auto", vec![ChatMessage::user("hi")]);
        assert!(!req.requires_tools());
        req.tools = Some(vec![serde_json::json!({"type": "function"})]);
        assert!(req.requires_tools());
    }

    #[test]
    fn joined_content_skips_null_contents() {
        let req = ChatRequest::new(
            "auto",
            vec![
                ChatMessage::system("a"),
                ChatMessage {
                    role: Role::Assistant,
                    name: None,
                    content: None,
                    tool_calls: None,
                },
                ChatMessage::user("b"),
            ],
        );
        assert_eq!(req.joined_content(), "a\n\nb");
    }

    #[test]
    fn unknown_optional_fields_stay_unserialized() {
        let req = ChatRequest::new("m", vec![ChatMessage::user("hi")]);
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("temperature").is_none());
        assert!(value.get("stop").is_none());
        // content is always present, even for the typed shape
        assert_eq!(value["messages"][0]["content"], "hi");
    }
}
