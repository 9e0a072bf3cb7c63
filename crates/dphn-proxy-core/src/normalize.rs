use dphn_proxy_contracts::{ChatCompletionsRequest, ChatMessage, NormalizedRequest, Role};
use tracing::{debug, warn};

pub const SYSTEM_SEPARATOR: &str = "\n\n";

/// Folds `system` messages into the next `user` turn. The upstream has no
/// system role, so system text is carried forward and prefixed to the
/// following user message, or appended as a trailing user message when no
/// user turn follows.
pub fn normalize_messages(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut pending = String::new();
    let mut normalized = Vec::with_capacity(messages.len());

    for message in messages {
        match &message.role {
            Role::System => {
                pending.push_str(&message.content);
                pending.push_str(SYSTEM_SEPARATOR);
            }
            Role::User if !pending.is_empty() => {
                let mut content = std::mem::take(&mut pending);
                content.push_str(&message.content);
                normalized.push(ChatMessage { content, ..message });
            }
            _ => normalized.push(message),
        }
    }

    if !pending.is_empty() {
        normalized.push(ChatMessage::new(Role::User, pending.trim()));
    }

    normalized
}

pub fn normalize_request(request: &ChatCompletionsRequest, default_model: &str) -> NormalizedRequest {
    let messages = request.messages();
    let received = messages.len();
    let skipped = request.messages.as_array().map_or(0, Vec::len) - received;
    if skipped > 0 {
        warn!(
            event = "request.messages.skipped",
            skipped,
            "messages without a string role were not forwarded"
        );
    }
    let messages = normalize_messages(messages);
    let model = request.requested_model().unwrap_or(default_model);
    debug!(
        event = "request.messages.normalized",
        model,
        messages_in = received,
        skipped,
        messages_out = messages.len()
    );
    NormalizedRequest::new(messages, model)
}
