//! Request builder: system instruction + history window + new user turn.

use medtutor_core::types::{ChatRequest, ChatTurn, MessageContent, Role};

use crate::registry::PromptConfig;

/// Build the wire request for one send.
///
/// The result always starts with exactly one system turn carrying the
/// category instruction, followed by at most `window` of the most recent
/// non-system history turns, followed by the new user turn. Placeholder
/// images left behind by persistence are dropped from history turns, and
/// a turn left with nothing to send is dropped entirely.
pub fn build_request(
    config: &PromptConfig,
    history: &[ChatTurn],
    user_content: MessageContent,
    window: usize,
    stream: bool,
) -> ChatRequest {
    let mut prior: Vec<ChatTurn> = history
        .iter()
        .filter(|t| t.role != Role::System)
        .map(|t| ChatTurn {
            role: t.role,
            content: t.content.strip_placeholder_images(),
        })
        .filter(|t| t.content.image_count() > 0 || !t.content.text().trim().is_empty())
        .collect();
    let start = prior.len().saturating_sub(window);

    let mut messages = Vec::with_capacity(prior.len() - start + 2);
    messages.push(ChatTurn::system(config.system_instruction));
    messages.extend(prior.drain(start..));
    messages.push(ChatTurn::user(user_content));

    ChatRequest {
        messages,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        stream,
    }
}
