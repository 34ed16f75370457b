//! DietBuddy Telegram Bot
//!
//! A conversational dieting assistant. This library provides the session
//! state machine, per-user timeout and no-reply timers, the message router
//! between the orchestrator and the dialogue agents, and the Telegram
//! channel glue.

#![allow(non_snake_case)]

pub mod config;
pub mod handlers;
pub mod services;
pub mod models;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{DietBuddyError, Result};

// Re-export main components for easy access
pub use handlers::{InboundEvent, Orchestrator};
pub use models::{DisplayMessage, RoutingMessage, State};
pub use services::ServiceFactory;
pub use state::{SessionStateMachine, StateStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
