//! Message handlers module
//!
//! Converts Telegram updates into [`InboundEvent`]s for the orchestrator.
//! Only private chats are served.

use teloxide::types::{ChatMemberUpdated, Message};
use tracing::debug;
use crate::handlers::controller::{InboundEvent, Orchestrator};
use crate::models::ImageContent;
use crate::services::channel::TelegramChannel;
use crate::utils::errors::Result;

/// Convert a message into an event, downloading voice and audio payloads
pub async fn inbound_from_message(msg: &Message, channel: &TelegramChannel) -> Result<Option<InboundEvent>> {
    if !msg.chat.is_private() {
        debug!(chat_id = ?msg.chat.id, "Ignoring message outside private chat");
        return Ok(None);
    }

    let user_id = msg.chat.id.0.to_string();
    let message_id = msg.id.0.to_string();

    if let Some(text) = msg.text() {
        return Ok(Some(InboundEvent::Text {
            user_id,
            message_id,
            text: text.to_string(),
        }));
    }

    let audio_file = msg
        .voice()
        .map(|voice| voice.file.id.to_string())
        .or_else(|| msg.audio().map(|audio| audio.file.id.to_string()));
    if let Some(file_id) = audio_file {
        let audio = channel.download(&file_id).await?;
        return Ok(Some(InboundEvent::Audio { user_id, message_id, audio }));
    }

    // Telegram lists photo sizes smallest first
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        let content = ImageContent {
            reference: photo.file.id.to_string(),
            mime_type: Some("image/jpeg".to_string()),
            size: Some(photo.file.size),
        };
        return Ok(Some(InboundEvent::Image { user_id, message_id, content }));
    }

    debug!(user_id = %user_id, "Unsupported message content");
    Ok(None)
}

/// Follow/unfollow from the bot's own membership in a private chat
pub fn inbound_from_member_update(update: &ChatMemberUpdated) -> Option<InboundEvent> {
    if !update.chat.is_private() {
        return None;
    }

    let user_id = update.chat.id.0.to_string();
    let was_present = update.old_chat_member.is_present();
    let is_present = update.new_chat_member.is_present();

    match (was_present, is_present) {
        (false, true) => Some(InboundEvent::Follow { user_id }),
        (true, false) => Some(InboundEvent::Unfollow { user_id }),
        _ => None,
    }
}

/// Handle incoming messages
pub async fn handle_message(msg: Message, channel: &TelegramChannel, orchestrator: &Orchestrator) -> Result<()> {
    match inbound_from_message(&msg, channel).await? {
        Some(event) => orchestrator.handle_event(event).await,
        None => Ok(()),
    }
}

/// Handle membership changes of the bot
pub async fn handle_member_update(update: ChatMemberUpdated, orchestrator: &Orchestrator) -> Result<()> {
    match inbound_from_member_update(&update) {
        Some(event) => orchestrator.handle_event(event).await,
        None => Ok(()),
    }
}
