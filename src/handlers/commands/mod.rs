//! Command handlers module
//!
//! Bot commands are thin aliases for orchestrator events.

use teloxide::{prelude::*, types::Message, utils::command::BotCommands};
use tracing::debug;
use crate::handlers::controller::{InboundEvent, Orchestrator, CANCEL_COMMAND};
use crate::utils::errors::Result;

/// All available bot commands
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "DietBuddy commands:")]
pub enum Command {
    #[command(description = "Start talking to DietBuddy")]
    Start,
    #[command(description = "Show help information")]
    Help,
    #[command(description = "Cancel the current session")]
    Cancel,
}

pub const HELP_TEXT: &str = "DietBuddy Help\n\n\
    /start - Start the bot\n\
    /help - Show this help message\n\
    /cancel - Cancel the current session\n\n\
    Say 'recommendation' and send a menu to get a meal suggestion.\n\
    Say 'setting' to enter your personal information.\n\
    Say 'feedback' to get your eating report.";

/// Event a command stands for, if any
pub fn command_event(cmd: &Command, msg: &Message) -> Option<InboundEvent> {
    let user_id = msg.chat.id.0.to_string();
    match cmd {
        Command::Start => Some(InboundEvent::Follow { user_id }),
        Command::Cancel => Some(InboundEvent::Text {
            user_id,
            message_id: msg.id.0.to_string(),
            text: CANCEL_COMMAND.to_string(),
        }),
        Command::Help => None,
    }
}

/// Main command dispatcher
pub async fn handle_command(bot: Bot, msg: Message, cmd: Command, orchestrator: &Orchestrator) -> Result<()> {
    debug!(chat_id = ?msg.chat.id, command = ?cmd, "Command received");
    match command_event(&cmd, &msg) {
        Some(event) => orchestrator.handle_event(event).await,
        None => {
            bot.send_message(msg.chat.id, HELP_TEXT).await?;
            Ok(())
        }
    }
}
