use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Opaque `template` value the upstream expects on every chat request.
pub const UPSTREAM_TEMPLATE: &str = "logical";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Other(role) => role,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "system" => Self::System,
            "user" => Self::User,
            "assistant" => Self::Assistant,
            _ => Self::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        match value {
            Role::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
pub struct ChatMessage {
    #[schema(value_type = String)]
    pub role: Role,
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: String,
    /// Fields the proxy does not interpret (`name`, ...); forwarded as-is.
    #[serde(flatten)]
    #[schema(ignore)]
    pub extra: BTreeMap<String, Value>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), extra: BTreeMap::new() }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, ToSchema)]
pub struct ChatCompletionsRequest {
    #[serde(default)]
    #[schema(value_type = Vec<ChatMessage>)]
    pub messages: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatCompletionsRequest {
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Client model id, treating an empty string the same as an absent one.
    pub fn requested_model(&self) -> Option<&str> {
        self.model.as_deref().map(str::trim).filter(|model| !model.is_empty())
    }

    /// Message list with the lenient reading the upstream contract needs:
    /// a missing or non-array `messages` is an empty list, and array items
    /// that are not objects with a string `role` are skipped. Any `content`
    /// is accepted.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let Some(items) = self.messages.as_array() else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| serde_json::from_value::<ChatMessage>(item.clone()).ok())
            .collect()
    }
}

/// Request body sent to the upstream chat endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub template: &'static str,
}

impl NormalizedRequest {
    pub fn new(messages: Vec<ChatMessage>, model: impl Into<String>) -> Self {
        Self { messages, model: model.into(), template: UPSTREAM_TEMPLATE }
    }
}

/// One decoded upstream `data:` payload. Every field is optional; a frame
/// missing any of them contributes nothing.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct UpstreamFrame {
    #[serde(default)]
    pub choices: Option<Vec<FrameChoice>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct FrameChoice {
    #[serde(default, deserialize_with = "lenient_delta")]
    pub delta: Option<FrameDelta>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct FrameDelta {
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
}

impl UpstreamFrame {
    fn first_choice(&self) -> Option<&FrameChoice> {
        self.choices.as_deref()?.first()
    }

    pub fn delta_content(&self) -> Option<&str> {
        self.first_choice()?.delta.as_ref()?.content.as_deref()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.first_choice()?.finish_reason.as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    /// Always zero: the upstream reports no token counts.
    pub usage: Usage,
}

impl ChatCompletionResponse {
    pub fn assistant(
        id: String,
        created: i64,
        model: String,
        content: String,
        finish_reason: String,
    ) -> Self {
        Self {
            id,
            object: "chat.completion".to_string(),
            created,
            model,
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage::new(Role::Assistant, content),
                finish_reason,
            }],
            usage: Usage::default(),
        }
    }
}

/// Never fails: content the proxy cannot interpret as text is forwarded as
/// its JSON rendering, so a message is only ever dropped for its role.
fn deserialize_content<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        Value::Array(parts) => parts.iter().filter_map(content_part_text).collect(),
        Value::Object(_) => match content_part_text(&value) {
            Some(text) => text.to_string(),
            None => value.to_string(),
        },
        scalar @ (Value::Number(_) | Value::Bool(_)) => scalar.to_string(),
    })
}

/// Reads an optional string field, treating any other JSON type as absent
/// instead of rejecting the enclosing frame.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        _ => None,
    })
}

fn lenient_delta<'de, D>(deserializer: D) -> Result<Option<FrameDelta>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .and_then(|value| serde_json::from_value::<FrameDelta>(value).ok()))
}

fn content_part_text(part: &Value) -> Option<&str> {
    match part {
        Value::String(text) => Some(text),
        Value::Object(map) => map.get("text").and_then(Value::as_str),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_defaults_when_fields_absent() {
        let request: ChatCompletionsRequest =
            serde_json::from_str("{}").expect("request must deserialize");
        assert!(!request.is_stream());
        assert_eq!(request.requested_model(), None);
        assert!(request.messages().is_empty());
    }

    #[test]
    fn empty_model_counts_as_absent() {
        let request: ChatCompletionsRequest =
            serde_json::from_str(r#"{"model":"  ","stream":true}"#).expect("must deserialize");
        assert_eq!(request.requested_model(), None);
        assert!(request.is_stream());
    }

    #[test]
    fn non_array_messages_degrade_to_empty() {
        let request: ChatCompletionsRequest =
            serde_json::from_str(r#"{"messages":"hello"}"#).expect("must deserialize");
        assert!(request.messages().is_empty());
    }

    #[test]
    fn malformed_items_are_skipped_and_unknown_roles_kept() {
        let request: ChatCompletionsRequest = serde_json::from_value(json!({
            "messages": [
                42,
                {"role": "tool", "content": "result", "tool_call_id": "call_1"},
                {"content": "no role"},
                {"role": "user", "content": null}
            ]
        }))
        .expect("must deserialize");
        let messages = request.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Other("tool".to_string()));
        assert_eq!(messages[0].extra.get("tool_call_id"), Some(&json!("call_1")));
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "");
    }

    #[test]
    fn non_text_content_is_kept_as_json_text() {
        let request: ChatCompletionsRequest = serde_json::from_value(json!({
            "messages": [
                {"role": "system", "content": 42},
                {"role": "system", "content": true},
                {"role": "user", "content": {"kind": "note"}},
                {"role": 7, "content": "bad role"}
            ]
        }))
        .expect("must deserialize");
        let contents = request
            .messages()
            .into_iter()
            .map(|message| message.content)
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["42", "true", r#"{"kind":"note"}"#]);
    }

    #[test]
    fn content_parts_are_joined_in_order() {
        let message: ChatMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "hello "},
                {"type": "image_url", "image_url": {"url": "https://example.com/a.png"}},
                {"type": "text", "text": "world"}
            ]
        }))
        .expect("message must deserialize");
        assert_eq!(message.content, "hello world");
    }

    #[test]
    fn normalized_request_serializes_template_constant() {
        let request =
            NormalizedRequest::new(vec![ChatMessage::new(Role::User, "hi")], "dolphinserver:24B");
        let value = serde_json::to_value(&request).expect("must serialize");
        assert_eq!(
            value,
            json!({
                "messages": [{"role": "user", "content": "hi"}],
                "model": "dolphinserver:24B",
                "template": "logical"
            })
        );
    }

    #[test]
    fn frame_accessors_tolerate_missing_fields() {
        let frame: UpstreamFrame = serde_json::from_str(r#"{"id":"x"}"#).expect("must parse");
        assert_eq!(frame.delta_content(), None);
        assert_eq!(frame.finish_reason(), None);

        let frame: UpstreamFrame =
            serde_json::from_str(r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#)
                .expect("must parse");
        assert_eq!(frame.delta_content(), None);
        assert_eq!(frame.finish_reason(), Some("length"));

        let frame: UpstreamFrame =
            serde_json::from_str(r#"{"choices":null}"#).expect("must parse");
        assert_eq!(frame.delta_content(), None);
    }

    #[test]
    fn mistyped_frame_fields_do_not_discard_siblings() {
        let frame: UpstreamFrame =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"x"},"finish_reason":1}]}"#)
                .expect("must parse");
        assert_eq!(frame.delta_content(), Some("x"));
        assert_eq!(frame.finish_reason(), None);

        let frame: UpstreamFrame =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":7},"finish_reason":"stop"}]}"#)
                .expect("must parse");
        assert_eq!(frame.delta_content(), None);
        assert_eq!(frame.finish_reason(), Some("stop"));

        let frame: UpstreamFrame =
            serde_json::from_str(r#"{"choices":[{"delta":"oops","finish_reason":"length"}]}"#)
                .expect("must parse");
        assert_eq!(frame.delta_content(), None);
        assert_eq!(frame.finish_reason(), Some("length"));
    }

    #[test]
    fn completion_response_has_openai_shape() {
        let response = ChatCompletionResponse::assistant(
            "chatcmpl-1".to_string(),
            1_700_000_000,
            "dolphinserver:24B".to_string(),
            "abc".to_string(),
            "stop".to_string(),
        );
        let value = serde_json::to_value(&response).expect("must serialize");
        assert_eq!(
            value,
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 1_700_000_000,
                "model": "dolphinserver:24B",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "abc"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}
            })
        );
    }
}
