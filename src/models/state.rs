//! Dialogue states and their timeout table
//!
//! Every user sits in exactly one [`State`]. States other than `Idle`,
//! `Unfollowing` and `Invalid` expire after a per-state duration into a
//! default next state.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::utils::errors::{DietBuddyError, Result};

/// Position of a user in the dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Idle,
    Following,
    Unfollowing,
    InitialInput,
    ParseMenu,
    AskMeal,
    Recommend,
    RecordMeal,
    AskWeight,
    Feedback,
    /// Sentinel for unknown or unparsable stored values
    #[serde(other)]
    Invalid,
}

impl State {
    /// All named states, `Invalid` excluded
    pub const ALL: [State; 10] = [
        State::Idle,
        State::Following,
        State::Unfollowing,
        State::InitialInput,
        State::ParseMenu,
        State::AskMeal,
        State::Recommend,
        State::RecordMeal,
        State::AskWeight,
        State::Feedback,
    ];

    /// Stored name of the state
    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "Idle",
            State::Following => "Following",
            State::Unfollowing => "Unfollowing",
            State::InitialInput => "InitialInput",
            State::ParseMenu => "ParseMenu",
            State::AskMeal => "AskMeal",
            State::Recommend => "Recommend",
            State::RecordMeal => "RecordMeal",
            State::AskWeight => "AskWeight",
            State::Feedback => "Feedback",
            State::Invalid => "Invalid",
        }
    }

    /// Parse a stored name. Anything that is not an exact state name,
    /// including "Invalid" itself, yields `Invalid`.
    pub fn from_name(name: &str) -> State {
        State::ALL
            .iter()
            .copied()
            .find(|state| state.name() == name)
            .unwrap_or(State::Invalid)
    }

    /// Parse a state name from a configuration key, ignoring ASCII case
    ///
    /// The config loader may lowercase table keys.
    pub fn from_config_key(key: &str) -> State {
        State::ALL
            .iter()
            .copied()
            .find(|state| state.name().eq_ignore_ascii_case(key))
            .unwrap_or(State::Invalid)
    }

    /// Whether the name denotes a real state
    pub fn is_valid_name(name: &str) -> bool {
        State::from_name(name) != State::Invalid
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, State::Idle)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, State::Invalid)
    }

    /// Terminal states are never left by a timeout
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Unfollowing)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Timeout rule for one state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTimeout {
    pub duration: Duration,
    pub next: State,
}

/// Per-state timeout durations and default next states
#[derive(Debug, Clone)]
pub struct TransitionTable {
    rules: HashMap<State, StateTimeout>,
}

impl TransitionTable {
    /// Build the default table
    pub fn new() -> Self {
        let mut rules = HashMap::new();
        let mut rule = |state: State, secs: u64, next: State| {
            rules.insert(state, StateTimeout { duration: Duration::from_secs(secs), next });
        };

        rule(State::Following, 600, State::Idle);
        rule(State::InitialInput, 600, State::Idle);
        rule(State::ParseMenu, 300, State::Idle);
        rule(State::AskMeal, 300, State::Idle);
        // Unanswered recommendations still get logged as a meal
        rule(State::Recommend, 120, State::RecordMeal);
        rule(State::RecordMeal, 300, State::Idle);
        rule(State::AskWeight, 300, State::Idle);
        rule(State::Feedback, 300, State::Idle);

        Self { rules }
    }

    /// Build the default table with durations overridden by state name
    pub fn with_overrides(overrides: &HashMap<String, u64>) -> Result<Self> {
        let mut table = Self::new();
        for (name, secs) in overrides {
            let state = State::from_config_key(name);
            table.set_duration(state, Duration::from_secs(*secs))?;
        }
        Ok(table)
    }

    /// Change the duration of a timed state
    pub fn set_duration(&mut self, state: State, duration: Duration) -> Result<()> {
        match self.rules.get_mut(&state) {
            Some(rule) => {
                rule.duration = duration;
                Ok(())
            }
            None => Err(DietBuddyError::Config(format!(
                "State {} has no timeout to configure",
                state
            ))),
        }
    }

    /// Timeout rule for a state, if it has one
    pub fn lookup(&self, state: State) -> Option<StateTimeout> {
        self.rules.get(&state).copied()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::new()
    }
}
