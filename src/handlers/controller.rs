//! Orchestrator
//!
//! Entry point for everything a user sends. It intercepts the reserved
//! commands, snapshots the user state, arms the no-reply fallback and hands
//! the message either to the idle classifier or to the router. It is also the
//! display sink relaying agent replies to the channel.

use std::sync::Arc;
use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use crate::config::settings::{InvalidStatePolicy, RoutingConfig};
use crate::models::{DisplayMessage, ImageContent, RoutingMessage, State};
use crate::services::channel::ChannelAdapter;
use crate::services::no_reply::NoReplyFallback;
use crate::services::router::{Agent, DisplaySink};
use crate::services::transcription::Transcriber;
use crate::state::machine::SessionStateMachine;
use crate::utils::errors::{DietBuddyError, Result};
use crate::utils::logging;

/// Reserved command returning the user to `Idle`
pub const CANCEL_COMMAND: &str = "CANCEL";

pub const CANCEL_REPLY: &str = "OK, the session is cancelled.";
pub const RECOGNITION_NOTICE: &str = "Speech recognition in progress, please wait...";
pub const RECOGNIZED_PREFIX: &str = "RECOGNIZED: ";

/// Event received from the messaging channel
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// The user started talking to the bot
    Follow { user_id: String },
    /// The user blocked or left the bot
    Unfollow { user_id: String },
    Text { user_id: String, message_id: String, text: String },
    Audio { user_id: String, message_id: String, audio: Vec<u8> },
    Image { user_id: String, message_id: String, content: ImageContent },
}

impl InboundEvent {
    pub fn user_id(&self) -> &str {
        match self {
            InboundEvent::Follow { user_id }
            | InboundEvent::Unfollow { user_id }
            | InboundEvent::Text { user_id, .. }
            | InboundEvent::Audio { user_id, .. }
            | InboundEvent::Image { user_id, .. } => user_id,
        }
    }
}

/// Orchestrator options taken from the settings
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub routing: RoutingConfig,
    /// Users allowed to force states; empty means everyone
    pub admin_ids: Vec<String>,
    pub transcription_notices: bool,
}

impl OrchestratorOptions {
    fn may_override(&self, user_id: &str) -> bool {
        self.routing.allow_state_override
            && (self.admin_ids.is_empty() || self.admin_ids.iter().any(|id| id == user_id))
    }
}

/// Coordinates inbound events, the state machine and outbound delivery
#[derive(Clone)]
pub struct Orchestrator {
    machine: SessionStateMachine,
    no_reply: NoReplyFallback,
    classifier: Arc<dyn Agent>,
    channel: Arc<dyn ChannelAdapter>,
    transcriber: Arc<dyn Transcriber>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        machine: SessionStateMachine,
        no_reply: NoReplyFallback,
        classifier: Arc<dyn Agent>,
        channel: Arc<dyn ChannelAdapter>,
        transcriber: Arc<dyn Transcriber>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            machine,
            no_reply,
            classifier,
            channel,
            transcriber,
            options,
        }
    }

    /// Handle one inbound channel event
    pub async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Follow { user_id } => {
                info!(user_id = %user_id, "User followed");
                self.machine.set_state(&user_id, State::Following).await?;
                Ok(())
            }
            InboundEvent::Unfollow { user_id } => {
                info!(user_id = %user_id, "User unfollowed");
                self.no_reply.cancel(&user_id);
                self.machine.set_state(&user_id, State::Unfollowing).await?;
                Ok(())
            }
            InboundEvent::Text { user_id, message_id, text } => {
                self.handle_text(&user_id, &message_id, &text).await
            }
            InboundEvent::Audio { user_id, message_id, audio } => {
                self.handle_audio(&user_id, &message_id, audio).await
            }
            InboundEvent::Image { user_id, message_id, content } => {
                self.handle_image(&user_id, &message_id, content).await
            }
        }
    }

    /// Handle text typed by the user
    pub async fn handle_text(&self, user_id: &str, message_id: &str, text: &str) -> Result<()> {
        debug!(user_id = user_id, message_id = message_id, "Text received");

        if text.trim().eq_ignore_ascii_case(CANCEL_COMMAND) {
            return self.cancel_session(user_id).await;
        }

        if self.options.may_override(user_id) {
            if let Some(name) = text.strip_prefix(self.options.routing.override_prefix.as_str()) {
                return self.override_state(user_id, name.trim()).await;
            }
        }

        self.route_text(user_id, message_id, text).await
    }

    /// Handle a voice or audio message
    ///
    /// The transcript goes straight to routing; reserved commands are not
    /// recognized in speech.
    pub async fn handle_audio(&self, user_id: &str, message_id: &str, audio: Vec<u8>) -> Result<()> {
        debug!(user_id = user_id, bytes = audio.len(), "Audio received");

        if self.options.transcription_notices {
            self.notify(user_id, RECOGNITION_NOTICE).await;
        }

        let text = match self.transcriber.transcribe(audio).await {
            Ok(text) => text,
            Err(e) => {
                warn!(user_id = user_id, error = %e, "Speech recognition failed");
                String::new()
            }
        };

        if self.options.transcription_notices {
            self.notify(user_id, &format!("{}{}", RECOGNIZED_PREFIX, text)).await;
        }

        self.route_text(user_id, message_id, &text).await
    }

    /// Handle an image sent by the user
    pub async fn handle_image(&self, user_id: &str, message_id: &str, content: ImageContent) -> Result<()> {
        let state = self.machine.get_state(user_id).await?;
        debug!(user_id = user_id, state = %state, reference = %content.reference, "Image received");
        self.machine
            .router()
            .publish(RoutingMessage::image(user_id, state, message_id, content));
        Ok(())
    }

    async fn cancel_session(&self, user_id: &str) -> Result<()> {
        info!(user_id = user_id, "Session cancelled by user");
        self.no_reply.cancel(user_id);
        self.machine.force_idle(user_id).await?;
        self.notify(user_id, CANCEL_REPLY).await;
        Ok(())
    }

    async fn override_state(&self, user_id: &str, name: &str) -> Result<()> {
        let state = State::from_name(name);
        if state.is_invalid() {
            warn!(user_id = user_id, requested = name, "Unknown state in override");
            self.notify(user_id, &format!("Unknown state: {}", name)).await;
            return Ok(());
        }

        info!(user_id = user_id, state = %state, "State override requested");
        let reply = if self.machine.set_state(user_id, state).await? {
            format!("State changed to {}.", state)
        } else {
            format!("Already in {}.", state)
        };
        self.notify(user_id, &reply).await;
        Ok(())
    }

    async fn route_text(&self, user_id: &str, message_id: &str, text: &str) -> Result<()> {
        let state = self.machine.get_state(user_id).await?;
        let message = RoutingMessage::text(user_id, state, message_id, text);
        self.no_reply.register(user_id);

        let to_classifier = match state {
            State::Idle => true,
            State::Invalid => self.options.routing.invalid_state_policy == InvalidStatePolicy::TreatAsIdle,
            _ => false,
        };

        if to_classifier {
            if let Err(e) = self.classifier.consume(message).await {
                error!(user_id = user_id, error = %e, "Intent classification failed");
            }
        } else {
            self.machine.router().publish(message);
        }
        Ok(())
    }

    /// Send an orchestrator notice straight to the channel
    async fn notify(&self, user_id: &str, text: &str) {
        let message = DisplayMessage::with_text(user_id, text);
        if let Err(e) = self.channel.send(user_id, &message.items).await {
            error!(user_id = user_id, error = %e, "Failed to send notice");
        }
    }

    pub fn machine(&self) -> &SessionStateMachine {
        &self.machine
    }

    pub fn no_reply(&self) -> &NoReplyFallback {
        &self.no_reply
    }
}

#[async_trait]
impl DisplaySink for Orchestrator {
    async fn deliver(&self, message: DisplayMessage) -> Result<()> {
        let user_id = message.user_id.as_str();

        // A fallback must not cancel the fallback of a newer turn
        if !message.fallback {
            self.no_reply.cancel(user_id);
            if let Some(age) = self.no_reply.take_fired(user_id) {
                logging::log_duplicate_reply(user_id, age);
            }
        }

        if message.is_empty() {
            debug!(user_id = user_id, "Empty display message dropped");
            return Ok(());
        }

        match self.channel.send(user_id, &message.items).await {
            Ok(()) => {
                logging::log_delivery(user_id, message.items.len(), true);
                Ok(())
            }
            Err(e) => {
                logging::log_delivery(user_id, message.items.len(), false);
                Err(DietBuddyError::Channel {
                    user_id: user_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(admins: Vec<&str>, allow: bool) -> OrchestratorOptions {
        let mut routing = crate::config::Settings::default().routing;
        routing.allow_state_override = allow;
        OrchestratorOptions {
            routing,
            admin_ids: admins.into_iter().map(String::from).collect(),
            transcription_notices: true,
        }
    }

    #[test]
    fn test_override_permissions() {
        assert!(options(vec![], true).may_override("anyone"));
        assert!(options(vec!["42"], true).may_override("42"));
        assert!(!options(vec!["42"], true).may_override("43"));
        assert!(!options(vec![], false).may_override("42"));
    }

    #[test]
    fn test_event_user_id() {
        let event = InboundEvent::Text {
            user_id: "u1".into(),
            message_id: "1".into(),
            text: "hi".into(),
        };
        assert_eq!(event.user_id(), "u1");
        assert_eq!(InboundEvent::Unfollow { user_id: "u2".into() }.user_id(), "u2");
    }
}
