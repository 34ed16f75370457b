//! Idle-state intent classifier
//!
//! Decides which dialogue a user in `Idle` wants to start from keywords in
//! their text. Unrecognized text gets no reply, so the no-reply fallback
//! answers with guidance.

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};
use crate::models::{DisplayMessage, MessageKind, RoutingMessage, State};
use crate::services::router::Agent;
use crate::state::machine::SessionStateMachine;
use crate::utils::errors::{DietBuddyError, Result};

/// Dialogue a user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Recommendation,
    InitialInput,
    Feedback,
}

impl Intent {
    /// State that starts the dialogue
    pub fn target_state(&self) -> State {
        match self {
            Intent::Recommendation => State::ParseMenu,
            Intent::InitialInput => State::InitialInput,
            Intent::Feedback => State::Feedback,
        }
    }

    fn prompt(&self) -> &'static str {
        match self {
            Intent::Recommendation => "Sure! Please send me the menu, as text or as a photo.",
            Intent::InitialInput => "Let's set up your personal information.",
            Intent::Feedback => "Let me prepare your feedback report.",
        }
    }
}

/// Keyword classifier serving `Idle` text messages
pub struct IntentClassifier {
    machine: SessionStateMachine,
    rules: Vec<(Intent, Regex)>,
}

const IDLE_STATES: [State; 1] = [State::Idle];

impl IntentClassifier {
    pub fn new(machine: SessionStateMachine) -> Result<Self> {
        // Checked in order; the first match wins
        let patterns = [
            (Intent::Recommendation, r"(?i)recommend|suggest|menu"),
            (Intent::InitialInput, r"(?i)setting|personal|info"),
            (Intent::Feedback, r"(?i)feedback|digest|report"),
        ];

        let rules = patterns
            .iter()
            .map(|(intent, pattern)| {
                Regex::new(pattern)
                    .map(|regex| (*intent, regex))
                    .map_err(|e| DietBuddyError::Config(format!("Invalid intent pattern: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { machine, rules })
    }

    /// Intent expressed by `text`, if any
    pub fn classify(&self, text: &str) -> Option<Intent> {
        self.rules
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(intent, _)| *intent)
    }
}

#[async_trait]
impl Agent for IntentClassifier {
    fn name(&self) -> &str {
        "intent_classifier"
    }

    fn states(&self) -> &[State] {
        &IDLE_STATES
    }

    fn accepts(&self, kind: MessageKind, state: State) -> bool {
        kind == MessageKind::Text && state == State::Idle
    }

    async fn consume(&self, message: RoutingMessage) -> Result<()> {
        let Some(intent) = self.classify(&message.text_content) else {
            debug!(user_id = %message.user_id, "No intent recognized");
            return Ok(());
        };

        info!(user_id = %message.user_id, intent = ?intent, "Intent recognized");
        self.machine
            .router()
            .publish_display(DisplayMessage::with_text(&message.user_id, intent.prompt()));
        self.machine
            .set_state(&message.user_id, intent.target_state())
            .await?;
        Ok(())
    }
}
