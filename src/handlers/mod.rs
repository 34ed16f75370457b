//! Bot handlers module
//!
//! This module contains the orchestrator and the Telegram-facing handlers:
//! - The orchestrator driving every inbound event
//! - The idle-state intent classifier
//! - Command and message handlers converting Telegram updates

pub mod classifier;
pub mod commands;
pub mod controller;
pub mod messages;

// Re-export commonly used handler types
pub use classifier::{Intent, IntentClassifier};
pub use commands::Command;
pub use controller::{InboundEvent, Orchestrator, OrchestratorOptions};
