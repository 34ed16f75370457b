//! No-reply fallback
//!
//! Every user turn arms a short timer. If no agent reply for that user is
//! delivered before it fires, the user receives a canned "I don't
//! understand" message with guidance matching their current state.

use std::sync::Arc;
use std::time::Duration;
use dashmap::DashMap;
use futures::FutureExt;
use rand::seq::SliceRandom;
use tokio::time::Instant;
use tracing::{error, info};
use crate::models::{DisplayMessage, State};
use crate::state::machine::SessionStateMachine;
use crate::state::timers::TimerSlots;
use crate::utils::errors::Result;

/// Replies used when nobody answered the user
pub const CANNED_REPLIES: [&str; 4] = [
    "Sorry, but I don't understand what you said.",
    "Oops, that is complicated for me.",
    "Well, that doesn't make sense to me.",
    "Well, I really do not understand that.",
];

/// Guidance appended for idle users
pub const IDLE_GUIDANCE: &str = "To set your personal info, send 'setting'.\n\
    If you want to obtain recommendation, please say 'recommendation'.\n\
    You can always cancel an operation by saying 'CANCEL'";

/// Guidance appended inside a session
pub const SESSION_GUIDANCE: &str = "You could cancel the session by saying CANCEL";

/// How long a fired fallback is remembered for duplicate-reply detection
const FIRED_RETENTION: Duration = Duration::from_secs(600);

/// Per-user fallback timers
#[derive(Clone)]
pub struct NoReplyFallback {
    slots: TimerSlots,
    machine: SessionStateMachine,
    delay: Duration,
    /// When the fallback last fired, per user, until the next turn
    fired: Arc<DashMap<String, Instant>>,
}

impl NoReplyFallback {
    pub fn new(machine: SessionStateMachine, delay: Duration) -> Self {
        Self {
            slots: TimerSlots::new("no_reply"),
            machine,
            delay,
            fired: Arc::new(DashMap::new()),
        }
    }

    /// Arm the fallback for a new user turn, replacing any pending one
    pub fn register(&self, user_id: &str) {
        self.fired.remove(user_id);
        let fallback = self.clone();
        let user = user_id.to_string();
        let action = async move {
            if let Err(e) = fallback.fire(&user).await {
                error!(user_id = %user, error = %e, "No-reply fallback failed");
            }
        }
        .boxed();
        self.slots.arm(user_id, None, None, self.delay, action);
    }

    /// Cancel the pending fallback; returns whether one was pending
    pub fn cancel(&self, user_id: &str) -> bool {
        let cancelled = self.slots.cancel(user_id);
        if cancelled {
            info!(user_id = user_id, "No reply callback cancelled");
        }
        cancelled
    }

    pub fn is_pending(&self, user_id: &str) -> bool {
        self.slots.is_armed(user_id)
    }

    /// Age of the fallback already sent in the current turn, clearing it
    pub fn take_fired(&self, user_id: &str) -> Option<Duration> {
        self.fired.remove(user_id).map(|(_, at)| at.elapsed())
    }

    /// Build the fallback text for a state
    pub fn compose(user_id: &str, state: State) -> DisplayMessage {
        let reply = CANNED_REPLIES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(CANNED_REPLIES[0]);
        let guidance = match state {
            State::Idle => IDLE_GUIDANCE,
            _ => SESSION_GUIDANCE,
        };

        let mut message = DisplayMessage::new(user_id)
            .append_text(reply)
            .append_text(guidance);
        message.fallback = true;
        message
    }

    async fn fire(&self, user_id: &str) -> Result<()> {
        let state = self.machine.get_state(user_id).await?;
        info!(user_id = user_id, state = %state, "No agent replied, sending fallback");
        self.fired.retain(|_, at| at.elapsed() < FIRED_RETENTION);
        self.fired.insert(user_id.to_string(), Instant::now());
        self.machine
            .router()
            .publish_display(Self::compose(user_id, state));
        Ok(())
    }

    pub fn cancel_all(&self) {
        self.slots.cancel_all();
        self.fired.clear();
    }
}
