//! Session state machine
//!
//! Owns the commit path for user states. A commit persists the new state,
//! publishes a transition notification and (re)arms or cancels the user's
//! timeout, all while holding that user's commit lock, so concurrent commits
//! for one user serialize and the loser sees the winner's value.

use std::sync::Arc;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, warn};
use crate::models::{RoutingMessage, State, TransitionTable};
use crate::services::router::MessageRouter;
use crate::utils::errors::{DietBuddyError, Result};
use crate::utils::logging;
use super::locks::UserLocks;
use super::storage::StateStore;
use super::timers::{TimeoutScheduler, TimerInfo};

/// Per-user dialogue state machine
#[derive(Clone)]
pub struct SessionStateMachine {
    store: Arc<dyn StateStore>,
    router: MessageRouter,
    table: Arc<TransitionTable>,
    timeouts: TimeoutScheduler,
    locks: UserLocks,
}

impl SessionStateMachine {
    pub fn new(store: Arc<dyn StateStore>, router: MessageRouter, table: TransitionTable) -> Self {
        Self {
            store,
            router,
            table: Arc::new(table),
            timeouts: TimeoutScheduler::new(),
            locks: UserLocks::new(),
        }
    }

    /// Current state of a user
    ///
    /// Users never written read as `Idle`; unparsable values as `Invalid`.
    pub async fn get_state(&self, user_id: &str) -> Result<State> {
        let stored = self.store.get(user_id).await?;
        let state = match stored {
            None => State::Idle,
            Some(name) => {
                let state = State::from_name(&name);
                if state.is_invalid() {
                    warn!(user_id = user_id, stored = %name, "Unparsable stored state");
                }
                state
            }
        };
        Ok(state)
    }

    /// Move a user to `new_state`
    ///
    /// Returns `false` without side effects when the user is already there.
    pub async fn set_state(&self, user_id: &str, new_state: State) -> Result<bool> {
        let _guard = self.locks.acquire(user_id).await;
        self.commit_locked(user_id, new_state).await
    }

    /// Commit `next` only if the user is still in `expected`
    ///
    /// This is the timeout path: a stale timer must never override a
    /// transition that happened after it was armed.
    pub async fn transition_if(&self, user_id: &str, expected: State, next: State) -> Result<bool> {
        let _guard = self.locks.acquire(user_id).await;
        let current = self.get_state(user_id).await?;
        if current != expected {
            debug!(user_id = user_id, expected = %expected, current = %current, "Stale timeout ignored");
            return Ok(false);
        }
        self.commit_locked(user_id, next).await
    }

    /// Force the user to `Idle` and make sure no timeout stays armed
    pub async fn force_idle(&self, user_id: &str) -> Result<bool> {
        let _guard = self.locks.acquire(user_id).await;
        let changed = self.commit_locked(user_id, State::Idle).await?;
        self.timeouts.cancel(user_id);
        Ok(changed)
    }

    async fn commit_locked(&self, user_id: &str, new_state: State) -> Result<bool> {
        if new_state.is_invalid() {
            return Err(DietBuddyError::InvalidStateTransition {
                from: "any".to_string(),
                to: new_state.to_string(),
            });
        }

        let current = self.get_state(user_id).await?;
        if current == new_state {
            debug!(user_id = user_id, state = %current, "State will not change");
            return Ok(false);
        }

        self.store.set(user_id, new_state.name()).await?;
        logging::log_state_transition(user_id, current, new_state);

        self.router.publish(RoutingMessage::transition(user_id, new_state));

        match self.table.lookup(new_state) {
            Some(rule) => {
                let on_fire = self.timeout_action(user_id, new_state, rule.next);
                self.timeouts.arm(user_id, new_state, rule.next, rule.duration, on_fire);
            }
            None => {
                self.timeouts.cancel(user_id);
            }
        }

        Ok(true)
    }

    /// Deferred guarded transition run by the timeout scheduler
    fn timeout_action(&self, user_id: &str, expected: State, next: State) -> BoxFuture<'static, ()> {
        let machine = self.clone();
        let user = user_id.to_string();
        async move {
            if let Err(e) = machine.transition_if(&user, expected, next).await {
                error!(user_id = %user, error = %e, "Timeout transition failed");
            }
        }
        .boxed()
    }

    /// Pending timeout of a user, if any
    pub fn timeout_info(&self, user_id: &str) -> Option<TimerInfo> {
        self.timeouts.info(user_id)
    }

    pub fn has_pending_timeout(&self, user_id: &str) -> bool {
        self.timeouts.is_armed(user_id)
    }

    /// Number of users with a pending timeout
    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.len()
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Cancel all pending timeouts
    pub fn shutdown(&self) {
        self.timeouts.cancel_all();
    }
}

impl std::fmt::Debug for SessionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateMachine")
            .field("table", &self.table)
            .field("pending_timeouts", &self.timeouts.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use crate::models::MessageKind;
    use crate::services::router::Agent;
    use crate::state::storage::MemoryStateStore;

    struct TransitionRecorder(Arc<Mutex<Vec<(String, State)>>>);

    #[async_trait]
    impl Agent for TransitionRecorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn states(&self) -> &[State] {
            &State::ALL
        }

        fn accepts(&self, kind: MessageKind, _state: State) -> bool {
            kind == MessageKind::Transition
        }

        async fn consume(&self, message: RoutingMessage) -> Result<()> {
            self.0.lock().unwrap().push((message.user_id, message.state));
            Ok(())
        }
    }

    fn machine_with_store() -> (SessionStateMachine, Arc<MemoryStateStore>) {
        let store = Arc::new(MemoryStateStore::new());
        let machine = SessionStateMachine::new(store.clone(), MessageRouter::new(), TransitionTable::new());
        (machine, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_user_is_idle() {
        let (machine, _) = machine_with_store();
        assert_eq!(machine.get_state("nobody").await.unwrap(), State::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_reads_as_invalid() {
        let (machine, store) = machine_with_store();
        store.set("u1", "Dancing").await.unwrap();
        assert_eq!(machine.get_state("u1").await.unwrap(), State::Invalid);

        // Invalid never equals a real state, so any commit goes through
        assert!(machine.set_state("u1", State::Idle).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_state_is_noop() {
        let (machine, store) = machine_with_store();
        assert!(machine.set_state("u1", State::AskMeal).await.unwrap());
        let armed = machine.timeout_info("u1").unwrap().generation;

        assert!(!machine.set_state("u1", State::AskMeal).await.unwrap());
        assert_eq!(store.get("u1").await.unwrap().as_deref(), Some("AskMeal"));
        assert_eq!(machine.timeout_info("u1").unwrap().generation, armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_target_rejected() {
        let (machine, _) = machine_with_store();
        assert_matches!(
            machine.set_state("u1", State::Invalid).await,
            Err(DietBuddyError::InvalidStateTransition { .. })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_is_published_after_persist() {
        let (machine, _) = machine_with_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        machine.router().subscribe_agent(Arc::new(TransitionRecorder(seen.clone())));

        machine.set_state("u1", State::ParseMenu).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*seen.lock().unwrap(), vec![("u1".to_string(), State::ParseMenu)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_moves_to_default_next_state() {
        let (machine, _) = machine_with_store();
        machine.set_state("u1", State::Recommend).await.unwrap();
        assert!(machine.has_pending_timeout("u1"));

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(machine.get_state("u1").await.unwrap(), State::RecordMeal);
        // Entering RecordMeal armed its own timeout
        assert_eq!(machine.timeout_info("u1").unwrap().expected_state, Some(State::RecordMeal));

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(machine.get_state("u1").await.unwrap(), State::Idle);
        assert!(!machine.has_pending_timeout("u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timeout_does_not_override() {
        let (machine, store) = machine_with_store();
        machine.set_state("u1", State::AskMeal).await.unwrap();

        // Independent change behind the machine's back
        store.set("u1", "Feedback").await.unwrap();
        tokio::time::sleep(Duration::from_secs(301)).await;

        assert_eq!(machine.get_state("u1").await.unwrap(), State::Feedback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_if_checks_expected_state() {
        let (machine, _) = machine_with_store();
        machine.set_state("u1", State::AskMeal).await.unwrap();
        assert!(!machine.transition_if("u1", State::Recommend, State::RecordMeal).await.unwrap());
        assert!(machine.transition_if("u1", State::AskMeal, State::Recommend).await.unwrap());
        assert_eq!(machine.get_state("u1").await.unwrap(), State::Recommend);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_idle_clears_timeout() {
        let (machine, _) = machine_with_store();
        machine.set_state("u1", State::Feedback).await.unwrap();
        assert!(machine.force_idle("u1").await.unwrap());
        assert!(!machine.has_pending_timeout("u1"));
        assert!(!machine.force_idle("u1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_state_has_no_timeout() {
        let (machine, _) = machine_with_store();
        machine.set_state("u1", State::AskMeal).await.unwrap();
        machine.set_state("u1", State::Unfollowing).await.unwrap();
        assert!(!machine.has_pending_timeout("u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_users_release_their_resources() {
        let (machine, _) = machine_with_store();
        for i in 0..200 {
            let user = format!("u{}", i);
            machine.set_state(&user, State::AskMeal).await.unwrap();
            machine.force_idle(&user).await.unwrap();
        }
        assert!(machine.locks.is_empty());
        assert_eq!(machine.pending_timeouts(), 0);
        assert_eq!(machine.router().active_lanes(), 200);

        tokio::time::sleep(crate::services::router::DEFAULT_LANE_IDLE + Duration::from_secs(1)).await;
        assert_eq!(machine.router().active_lanes(), 0);

        // Returning users work as before
        assert!(machine.set_state("u7", State::Feedback).await.unwrap());
        assert!(machine.locks.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_commits_serialize() {
        let (machine, _) = machine_with_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        machine.router().subscribe_agent(Arc::new(TransitionRecorder(seen.clone())));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let machine = machine.clone();
            tasks.push(tokio::spawn(async move { machine.set_state("u1", State::AskWeight).await.unwrap() }));
        }

        let mut committed = 0;
        for task in tasks {
            if task.await.unwrap() {
                committed += 1;
            }
        }
        assert_eq!(committed, 1);
        assert_eq!(machine.pending_timeouts(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
        machine.shutdown();
    }
}
