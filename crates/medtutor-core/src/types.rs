use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to a conversation before its first user message is known.
pub const DEFAULT_CONVERSATION_TITLE: &str = "Nova Conversa";

/// URL stored in place of image data when a conversation is persisted.
pub const IMAGE_PLACEHOLDER: &str = "[imagem]";

/// Maximum characters of the first user message used as a title.
const TITLE_MAX_CHARS: usize = 60;

// =============================================================================
// Conversation turns
// =============================================================================

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Reference to an image, usually a `data:` URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One typed part of a multi-part message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Message content: plain text or an ordered list of parts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Build user content from attached image URLs and text.
    ///
    /// Images come first. Content holding only text collapses to
    /// [`MessageContent::Text`].
    pub fn from_text_and_images(text: &str, image_urls: &[String]) -> Self {
        if image_urls.is_empty() {
            return MessageContent::Text(text.to_string());
        }
        let mut parts: Vec<ContentPart> = image_urls
            .iter()
            .map(|url| ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            })
            .collect();
        if !text.is_empty() {
            parts.push(ContentPart::Text {
                text: text.to_string(),
            });
        }
        MessageContent::Parts(parts)
    }

    /// Concatenated text of all text parts, space separated.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Number of image parts.
    pub fn image_count(&self) -> usize {
        match self {
            MessageContent::Text(_) => 0,
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|p| matches!(p, ContentPart::ImageUrl { .. }))
                .count(),
        }
    }

    /// Copy with every image URL replaced by [`IMAGE_PLACEHOLDER`].
    pub fn without_image_data(&self) -> Self {
        match self {
            MessageContent::Text(_) => self.clone(),
            MessageContent::Parts(parts) => MessageContent::Parts(
                parts
                    .iter()
                    .map(|p| match p {
                        ContentPart::ImageUrl { .. } => ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: IMAGE_PLACEHOLDER.to_string(),
                            },
                        },
                        other => other.clone(),
                    })
                    .collect(),
            ),
        }
    }

    /// Copy without placeholder image parts.
    ///
    /// History reloaded from storage carries [`IMAGE_PLACEHOLDER`] where the
    /// image data used to be; those parts must not reach the model. Content
    /// left with only text collapses to [`MessageContent::Text`].
    pub fn strip_placeholder_images(&self) -> Self {
        match self {
            MessageContent::Text(_) => self.clone(),
            MessageContent::Parts(parts) => {
                let kept: Vec<ContentPart> = parts
                    .iter()
                    .filter(|p| {
                        !matches!(p, ContentPart::ImageUrl { image_url } if image_url.url == IMAGE_PLACEHOLDER)
                    })
                    .cloned()
                    .collect();
                if kept.iter().all(|p| matches!(p, ContentPart::Text { .. })) {
                    MessageContent::Text(MessageContent::Parts(kept).text())
                } else {
                    MessageContent::Parts(kept)
                }
            }
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

/// A single message in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatTurn {
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// =============================================================================
// Wire request
// =============================================================================

/// Chat-completions request body sent to the provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default)]
    pub stream: bool,
}

// =============================================================================
// Uploads
// =============================================================================

/// An uploaded image, ready to be attached to a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub base64: String,
    pub mime_type: String,
    pub data_url: String,
    pub original_name: String,
    pub size: usize,
}

impl ImageAttachment {
    /// Build an attachment from an already base64-encoded payload.
    pub fn new(base64: String, mime_type: &str, original_name: &str, size: usize) -> Self {
        let data_url = format!("data:{};base64,{}", mime_type, base64);
        Self {
            base64,
            mime_type: mime_type.to_string(),
            data_url,
            original_name: original_name.to_string(),
            size,
        }
    }
}

// =============================================================================
// Persistence records
// =============================================================================

/// A persisted conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredConversation {
    pub id: String,
    pub title: String,
    pub turns: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry for the conversation history sidebar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Generate a fresh conversation id.
pub fn new_conversation_id() -> String {
    format!("conv-{}", Uuid::new_v4())
}

/// Derive a conversation title from the first user message.
pub fn title_from_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        let head: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn test_text_content_serializes_as_string() {
        let turn = ChatTurn::user("olá");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "olá");
    }

    #[test]
    fn test_parts_content_wire_format() {
        let content =
            MessageContent::from_text_and_images("descreva", &["data:image/png;base64,AA".into()]);
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json[0]["type"], "image_url");
        assert_eq!(json[0]["image_url"]["url"], "data:image/png;base64,AA");
        assert_eq!(json[1]["type"], "text");
        assert_eq!(json[1]["text"], "descreva");
    }

    #[test]
    fn test_parts_content_deserializes() {
        let json = r#"[{"type":"text","text":"a"},{"type":"image_url","image_url":{"url":"x"}}]"#;
        let content: MessageContent = serde_json::from_str(json).unwrap();
        assert_eq!(content.image_count(), 1);
        assert_eq!(content.text(), "a");
    }

    #[test]
    fn test_text_only_collapses_to_text() {
        let content = MessageContent::from_text_and_images("só texto", &[]);
        assert_eq!(content, MessageContent::Text("só texto".to_string()));
    }

    #[test]
    fn test_images_only_has_no_text_part() {
        let content = MessageContent::from_text_and_images("", &["u1".into(), "u2".into()]);
        assert_eq!(content.image_count(), 2);
        assert_eq!(content.text(), "");
    }

    #[test]
    fn test_without_image_data_replaces_urls() {
        let content =
            MessageContent::from_text_and_images("veja", &["data:image/png;base64,AAAA".into()]);
        let light = content.without_image_data();
        let json = serde_json::to_value(&light).unwrap();
        assert_eq!(json[0]["image_url"]["url"], IMAGE_PLACEHOLDER);
        assert_eq!(light.text(), "veja");
    }

    #[test]
    fn test_strip_placeholder_images() {
        let stored = MessageContent::from_text_and_images("veja", &["data:x".into()])
            .without_image_data();
        assert_eq!(
            stored.strip_placeholder_images(),
            MessageContent::Text("veja".to_string())
        );

        let live = MessageContent::from_text_and_images("veja", &["data:x".into()]);
        assert_eq!(live.strip_placeholder_images(), live);
    }

    #[test]
    fn test_image_attachment_data_url() {
        let att = ImageAttachment::new("QUJD".to_string(), "image/jpeg", "rx.jpg", 3);
        assert_eq!(att.data_url, "data:image/jpeg;base64,QUJD");
        let json = serde_json::to_value(&att).unwrap();
        assert_eq!(json["mimeType"], "image/jpeg");
        assert_eq!(json["dataUrl"], "data:image/jpeg;base64,QUJD");
        assert_eq!(json["originalName"], "rx.jpg");
    }

    #[test]
    fn test_chat_request_stream_defaults_false() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"messages":[],"max_tokens":10,"temperature":0.1}"#).unwrap();
        assert!(!req.stream);
    }

    #[test]
    fn test_title_from_short_text() {
        assert_eq!(title_from_text("  sepse  "), "sepse");
    }

    #[test]
    fn test_title_from_long_text_is_truncated() {
        let text = "á".repeat(80);
        let title = title_from_text(&text);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 63);
    }

    #[test]
    fn test_new_conversation_id_is_unique() {
        let a = new_conversation_id();
        let b = new_conversation_id();
        assert!(a.starts_with("conv-"));
        assert_ne!(a, b);
    }
}
