//! DietBuddy Telegram Bot
//!
//! Main application entry point

use std::sync::Arc;
use anyhow::Context;
use teloxide::{prelude::*, types::{ChatMemberUpdated, Update}};
use teloxide::dispatching::UpdateHandler;
use tracing::{error, info, warn};

use DietBuddy::{
    config::Settings,
    utils::logging,
    services::{self, ServiceFactory, TelegramChannel},
    handlers::{
        commands::{self, Command},
        messages,
    },
};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new().context("failed to load configuration")?;
    settings.validate()?;

    // Initialize logging; the guard flushes the log file on exit
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", DietBuddy::info());

    info!(backend = ?settings.storage.backend, "Opening state store...");
    let store = services::create_state_store(&settings).await?;

    // Initialize bot
    let bot = Bot::new(&settings.bot.token);
    let channel = TelegramChannel::new(bot.clone());
    let transcriber = services::create_transcriber(&settings.transcription)?;

    info!("Initializing services...");
    let services = ServiceFactory::new(settings.clone(), store, Arc::new(channel.clone()), transcriber)?;

    let health = services.health_check().await;
    info!(agents = health.agents, pending_timeouts = health.pending_timeouts, active_lanes = health.active_lanes, "Health check complete");
    for issue in health.get_issues() {
        warn!(issue = %issue, "Health check");
    }
    if !health.is_healthy() {
        anyhow::bail!("state store is not reachable");
    }

    let services_arc = Arc::new(services);
    let channel_arc = Arc::new(channel);

    let mut dispatcher = Dispatcher::builder(bot, create_handler())
        .dependencies(dptree::deps![services_arc.clone(), channel_arc])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd);
        })
        .enable_ctrlc_handler()
        .build();

    info!("DietBuddy bot is ready, starting polling...");
    dispatcher.dispatch().await;

    services_arc.shutdown();
    info!("DietBuddy bot has been shut down.");

    Ok(())
}

/// Create the main update handler
fn create_handler() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use teloxide::dispatching::UpdateFilterExt;

    dptree::entry()
        .branch(
            Update::filter_message()
                .branch(
                    // Handle commands
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_commands),
                )
                .branch(
                    // Handle regular messages
                    dptree::endpoint(handle_messages),
                ),
        )
        .branch(
            // Handle my chat member updates (user started or blocked the bot)
            Update::filter_my_chat_member().endpoint(handle_chat_member_updates),
        )
}

/// Handle bot commands
async fn handle_commands(
    bot: Bot,
    msg: Message,
    cmd: Command,
    services: Arc<ServiceFactory>,
) -> HandlerResult {
    if let Err(e) = commands::handle_command(bot, msg, cmd, &services.orchestrator).await {
        error!(error = %e, "Error handling command");
        return Err(e.into());
    }

    Ok(())
}

/// Handle regular messages
async fn handle_messages(
    msg: Message,
    services: Arc<ServiceFactory>,
    channel: Arc<TelegramChannel>,
) -> HandlerResult {
    if let Err(e) = messages::handle_message(msg, &channel, &services.orchestrator).await {
        error!(error = %e, "Error handling message");
        return Err(e.into());
    }

    Ok(())
}

/// Handle chat member updates
async fn handle_chat_member_updates(
    update: ChatMemberUpdated,
    services: Arc<ServiceFactory>,
) -> HandlerResult {
    if let Err(e) = messages::handle_member_update(update, &services.orchestrator).await {
        error!(error = %e, "Error handling chat member update");
        return Err(e.into());
    }

    Ok(())
}
