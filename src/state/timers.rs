//! Per-user single-slot timers
//!
//! [`TimerSlots`] keeps at most one pending timer per user. Arming replaces
//! (and aborts) the previous timer under the map entry lock, and a firing
//! task only runs its action if it still owns the slot. Cancellation is best
//! effort: an action already running is not interrupted, which is why timeout
//! actions revalidate the user state before committing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::task::AbortHandle;
use tracing::debug;
use crate::models::State;
use crate::utils::logging;

/// Snapshot of a pending timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerInfo {
    pub generation: u64,
    pub expected_state: Option<State>,
    pub next_state: Option<State>,
    pub armed_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug)]
struct TimerEntry {
    info: TimerInfo,
    task: AbortHandle,
}

/// Single-slot timer registry keyed by user id
#[derive(Debug, Clone)]
pub struct TimerSlots {
    kind: &'static str,
    slots: Arc<DashMap<String, TimerEntry>>,
    generation: Arc<AtomicU64>,
}

impl TimerSlots {
    /// Create an empty registry; `kind` labels log lines
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            slots: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Install a timer for `user_id`, replacing any pending one
    ///
    /// `action` runs after `delay` unless the timer is cancelled or replaced
    /// first. Returns the generation of the new timer.
    pub fn arm(
        &self,
        user_id: &str,
        expected_state: Option<State>,
        next_state: Option<State>,
        delay: Duration,
        action: BoxFuture<'static, ()>,
    ) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let armed_at = Utc::now();
        let deadline = armed_at
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        // Holding the entry while spawning keeps a zero-delay task from
        // releasing its slot before it is installed.
        let entry = self.slots.entry(user_id.to_string());

        let slots = self.clone();
        let user = user_id.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if slots.release(&user, generation) {
                logging::log_timer_fired(slots.kind, &user, true);
                action.await;
            } else {
                logging::log_timer_fired(slots.kind, &user, false);
            }
        });

        let new_entry = TimerEntry {
            info: TimerInfo {
                generation,
                expected_state,
                next_state,
                armed_at,
                deadline,
            },
            task: task.abort_handle(),
        };

        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(new_entry);
                previous.task.abort();
                debug!(timer = self.kind, user_id = user_id, replaced = previous.info.generation, "Replaced pending timer");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(new_entry);
            }
        }

        logging::log_timer_armed(self.kind, user_id, expected_state, delay);
        generation
    }

    /// Cancel the pending timer for a user; returns whether one was pending
    pub fn cancel(&self, user_id: &str) -> bool {
        match self.slots.remove(user_id) {
            Some((_, entry)) => {
                entry.task.abort();
                debug!(timer = self.kind, user_id = user_id, generation = entry.info.generation, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Remove the slot if it still belongs to `generation`
    fn release(&self, user_id: &str, generation: u64) -> bool {
        self.slots
            .remove_if(user_id, |_, entry| entry.info.generation == generation)
            .is_some()
    }

    pub fn is_armed(&self, user_id: &str) -> bool {
        self.slots.contains_key(user_id)
    }

    pub fn info(&self, user_id: &str) -> Option<TimerInfo> {
        self.slots.get(user_id).map(|entry| entry.info.clone())
    }

    /// Number of pending timers
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Cancel every pending timer
    pub fn cancel_all(&self) {
        self.slots.retain(|_, entry| {
            entry.task.abort();
            false
        });
    }
}

/// Auto-transition timers: one per user, armed on every timed state entry
#[derive(Debug, Clone)]
pub struct TimeoutScheduler {
    slots: TimerSlots,
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self {
            slots: TimerSlots::new("timeout"),
        }
    }

    /// Arm the user's timeout; `on_fire` performs the guarded transition
    pub fn arm(
        &self,
        user_id: &str,
        expected_state: State,
        next_state: State,
        delay: Duration,
        on_fire: BoxFuture<'static, ()>,
    ) -> u64 {
        self.slots
            .arm(user_id, Some(expected_state), Some(next_state), delay, on_fire)
    }

    pub fn cancel(&self, user_id: &str) -> bool {
        self.slots.cancel(user_id)
    }

    pub fn is_armed(&self, user_id: &str) -> bool {
        self.slots.is_armed(user_id)
    }

    pub fn info(&self, user_id: &str) -> Option<TimerInfo> {
        self.slots.info(user_id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn cancel_all(&self) {
        self.slots.cancel_all()
    }
}

impl Default for TimeoutScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;

    fn counting_action(counter: &Arc<AtomicUsize>) -> BoxFuture<'static, ()> {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_and_clears_slot() {
        let slots = TimerSlots::new("test");
        let fired = Arc::new(AtomicUsize::new(0));

        slots.arm("u1", None, None, Duration::from_secs(1), counting_action(&fired));
        assert!(slots.is_armed("u1"));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slots.is_armed("u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let slots = TimerSlots::new("test");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let g1 = slots.arm("u1", Some(State::AskMeal), Some(State::Idle), Duration::from_secs(1), counting_action(&first));
        let g2 = slots.arm("u1", Some(State::Recommend), Some(State::RecordMeal), Duration::from_secs(2), counting_action(&second));
        assert!(g2 > g1);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots.info("u1").unwrap().expected_state, Some(State::Recommend));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let slots = TimerSlots::new("test");
        let fired = Arc::new(AtomicUsize::new(0));

        slots.arm("u1", None, None, Duration::from_secs(1), counting_action(&fired));
        assert!(slots.cancel("u1"));
        assert!(!slots.cancel("u1"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_have_independent_slots() {
        let scheduler = TimeoutScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.arm("u1", State::AskMeal, State::Idle, Duration::from_secs(1), counting_action(&fired));
        scheduler.arm("u2", State::AskMeal, State::Idle, Duration::from_secs(1), counting_action(&fired));
        assert_eq!(scheduler.len(), 2);

        scheduler.cancel("u1");
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_info_reports_deadline() {
        let scheduler = TimeoutScheduler::new();
        scheduler.arm("u1", State::Recommend, State::RecordMeal, Duration::from_secs(120), async {}.boxed());

        let info = scheduler.info("u1").unwrap();
        assert_eq!(info.next_state, Some(State::RecordMeal));
        assert_eq!((info.deadline - info.armed_at).num_seconds(), 120);
        scheduler.cancel_all();
        assert!(scheduler.is_empty());
    }
}
