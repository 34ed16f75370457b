//! Messaging channel adapter
//!
//! The orchestrator only knows [`ChannelAdapter`]; [`TelegramChannel`] is
//! the production implementation on top of the Bot API.

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::debug;
use url::Url;
use crate::models::ContentItem;
use crate::utils::errors::{DietBuddyError, Result};

/// Outbound side of the messaging channel
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Send items to a user, in order
    async fn send(&self, user_id: &str, items: &[ContentItem]) -> Result<()>;
}

/// Telegram Bot API channel
#[derive(Clone)]
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Fetch the bytes of a file the user sent (voice, audio)
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self.bot.get_file(file_id).await?;
        let mut buffer = Vec::with_capacity(file.size as usize);
        self.bot.download_file(&file.path, &mut buffer).await?;
        debug!(file_id = file_id, bytes = buffer.len(), "Downloaded file");
        Ok(buffer)
    }
}

/// Telegram chats are addressed by numeric id
pub fn chat_id_for(user_id: &str) -> Result<ChatId> {
    user_id
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| DietBuddyError::Channel {
            user_id: user_id.to_string(),
            reason: "user id is not a Telegram chat id".to_string(),
        })
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    async fn send(&self, user_id: &str, items: &[ContentItem]) -> Result<()> {
        let chat_id = chat_id_for(user_id)?;

        for item in items {
            match item {
                ContentItem::Text { text } => {
                    self.bot.send_message(chat_id, text.clone()).await?;
                }
                ContentItem::Image { original_url, .. } => {
                    let url = Url::parse(original_url)?;
                    self.bot.send_photo(chat_id, InputFile::url(url)).await?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_chat_id_parsing() {
        assert_eq!(chat_id_for("123456").unwrap(), ChatId(123456));
        assert_eq!(chat_id_for("-1001234").unwrap(), ChatId(-1001234));
        assert_matches!(chat_id_for("alice"), Err(DietBuddyError::Channel { .. }));
    }
}
