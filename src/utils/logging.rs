//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the DietBuddy application.

use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use crate::config::LoggingConfig;
use crate::models::State;
use crate::utils::errors::{DietBuddyError, Result};

/// Initialize logging based on configuration
///
/// The returned guard flushes the file writer when dropped, so the caller
/// must keep it alive for the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.file_path, "dietbuddy.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()
        .map_err(|e| DietBuddyError::Config(format!("Failed to install subscriber: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log a committed state transition
pub fn log_state_transition(user_id: &str, from: State, to: State) {
    info!(
        user_id = user_id,
        from = %from,
        to = %to,
        "State transition committed"
    );
}

/// Log a timer being armed
pub fn log_timer_armed(kind: &str, user_id: &str, expected_state: Option<State>, delay: Duration) {
    debug!(
        timer = kind,
        user_id = user_id,
        expected_state = ?expected_state,
        delay_ms = delay.as_millis() as u64,
        "Timer armed"
    );
}

/// Log a timer firing
pub fn log_timer_fired(kind: &str, user_id: &str, acted: bool) {
    if acted {
        info!(timer = kind, user_id = user_id, "Timer fired");
    } else {
        debug!(timer = kind, user_id = user_id, "Timer fired but precondition no longer holds");
    }
}

/// Log an outbound delivery result
pub fn log_delivery(user_id: &str, items: usize, success: bool) {
    if success {
        debug!(user_id = user_id, items = items, "Display message delivered");
    } else {
        error!(user_id = user_id, items = items, "Display message delivery failed");
    }
}

/// Log a reply that raced with an already-sent fallback
pub fn log_duplicate_reply(user_id: &str, fallback_age: Duration) {
    warn!(
        user_id = user_id,
        fallback_age_ms = fallback_age.as_millis() as u64,
        "Agent reply delivered after the no-reply fallback was already sent"
    );
}
