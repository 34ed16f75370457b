//! Data models module
//!
//! This module contains the dialogue state model and the message types
//! exchanged over the router.

pub mod message;
pub mod state;

// Re-export models
pub use message::{ContentItem, DisplayMessage, ImageContent, MessageKind, RoutingMessage};
pub use state::{State, StateTimeout, TransitionTable};
