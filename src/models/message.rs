//! Messages carried by the router
//!
//! [`RoutingMessage`] flows from the orchestrator and the state machine
//! toward agents; [`DisplayMessage`] flows from agents toward the channel.

use serde::{Deserialize, Serialize};
use tracing::info;
use super::state::State;

/// Kind of an inbound routing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    #[serde(other)]
    Transition,
}

impl MessageKind {
    /// Parse a kind name, normalizing unknown values to `Transition`
    pub fn parse(name: &str) -> Self {
        match name {
            "text" => MessageKind::Text,
            "image" => MessageKind::Image,
            "transition" => MessageKind::Transition,
            other => {
                info!(kind = other, "Invalid message kind, using transition");
                MessageKind::Transition
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Transition => "transition",
        }
    }
}

/// Reference to image content held by the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    /// Channel-specific handle (a Telegram file id)
    pub reference: String,
    pub mime_type: Option<String>,
    pub size: Option<u32>,
}

/// Message routed to dialogue-step agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingMessage {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// User state when the message was published
    pub state: State,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub text_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_content: Option<ImageContent>,
}

impl RoutingMessage {
    /// Text typed (or spoken) by the user
    pub fn text(user_id: &str, state: State, message_id: &str, text: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind: MessageKind::Text,
            state,
            message_id: message_id.to_string(),
            text_content: text.to_string(),
            image_content: None,
        }
    }

    /// Image sent by the user
    pub fn image(user_id: &str, state: State, message_id: &str, content: ImageContent) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind: MessageKind::Image,
            state,
            message_id: message_id.to_string(),
            text_content: String::new(),
            image_content: Some(content),
        }
    }

    /// Notification that the user entered `state`
    pub fn transition(user_id: &str, state: State) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind: MessageKind::Transition,
            state,
            message_id: uuid::Uuid::new_v4().to_string(),
            text_content: String::new(),
            image_content: None,
        }
    }
}

/// One renderable item of a display message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text {
        #[serde(rename = "textContent")]
        text: String,
    },
    Image {
        #[serde(rename = "originalContentUrl")]
        original_url: String,
        #[serde(rename = "previewContentUrl")]
        preview_url: String,
    },
}

/// Message to be shown to the user through the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMessage {
    pub user_id: String,
    #[serde(default)]
    pub items: Vec<ContentItem>,
    /// Produced by the no-reply fallback rather than an agent
    #[serde(default)]
    pub fallback: bool,
}

impl DisplayMessage {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            items: Vec::new(),
            fallback: false,
        }
    }

    /// Convenience constructor for a single text item
    pub fn with_text(user_id: &str, text: impl Into<String>) -> Self {
        Self::new(user_id).append_text(text)
    }

    pub fn append_text(mut self, text: impl Into<String>) -> Self {
        self.items.push(ContentItem::Text { text: text.into() });
        self
    }

    pub fn append_image(mut self, original_url: impl Into<String>, preview_url: impl Into<String>) -> Self {
        self.items.push(ContentItem::Image {
            original_url: original_url.into(),
            preview_url: preview_url.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Concatenated text items, for logs and tests
    pub fn text_lines(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(text.as_str()),
                ContentItem::Image { .. } => None,
            })
            .collect()
    }
}
