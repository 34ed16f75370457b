//! Test doubles for the channel, the transcriber and dialogue agents

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use DietBuddy::models::{ContentItem, DisplayMessage, MessageKind, RoutingMessage, State};
use DietBuddy::services::{Agent, ChannelAdapter, Transcriber};
use DietBuddy::state::SessionStateMachine;
use DietBuddy::utils::errors::{DietBuddyError, Result, TranscriptionError, TranscriptionResult};

/// Channel recording everything sent through it
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, ContentItem)>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following send fail
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Texts sent to a user, in order
    pub fn texts_for(&self, user_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(user, _)| user == user_id)
            .filter_map(|(_, item)| match item {
                ContentItem::Text { text } => Some(text.clone()),
                ContentItem::Image { .. } => None,
            })
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelAdapter for RecordingChannel {
    async fn send(&self, user_id: &str, items: &[ContentItem]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DietBuddyError::Channel {
                user_id: user_id.to_string(),
                reason: "channel down".to_string(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        for item in items {
            sent.push((user_id.to_string(), item.clone()));
        }
        Ok(())
    }
}

/// Transcriber returning a fixed transcript, or failing when none is set
pub struct ScriptedTranscriber {
    transcript: Option<String>,
}

impl ScriptedTranscriber {
    pub fn returning(text: &str) -> Arc<Self> {
        Arc::new(Self { transcript: Some(text.to_string()) })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { transcript: None })
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _audio: Vec<u8>) -> TranscriptionResult<String> {
        self.transcript
            .clone()
            .ok_or_else(|| TranscriptionError::RequestFailed("recognizer offline".to_string()))
    }
}

/// Dialogue agent answering every text or image in one state
pub struct ScriptedAgent {
    name: String,
    states: Vec<State>,
    reply: Option<String>,
    next: Option<State>,
    delay: Option<Duration>,
    machine: SessionStateMachine,
    seen: Mutex<Vec<RoutingMessage>>,
}

impl ScriptedAgent {
    pub fn new(name: &str, state: State, machine: SessionStateMachine) -> Self {
        Self {
            name: name.to_string(),
            states: vec![state],
            reply: None,
            next: None,
            delay: None,
            machine,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(mut self, reply: &str) -> Self {
        self.reply = Some(reply.to_string());
        self
    }

    pub fn moving_to(mut self, next: State) -> Self {
        self.next = Some(next);
        self
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn seen(&self) -> Vec<RoutingMessage> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn states(&self) -> &[State] {
        &self.states
    }

    fn accepts(&self, kind: MessageKind, state: State) -> bool {
        kind != MessageKind::Transition && self.states.contains(&state)
    }

    async fn consume(&self, message: RoutingMessage) -> Result<()> {
        self.seen.lock().unwrap().push(message.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reply) = &self.reply {
            self.machine
                .router()
                .publish_display(DisplayMessage::with_text(&message.user_id, reply.clone()));
        }
        if let Some(next) = self.next {
            self.machine.set_state(&message.user_id, next).await?;
        }
        Ok(())
    }
}
