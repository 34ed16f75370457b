//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use crate::models::State;
use crate::utils::errors::{DietBuddyError, Result};
use super::{Settings, StorageBackend};

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_bot_config(&settings.bot)?;
    if settings.storage.backend == StorageBackend::Redis {
        validate_redis_config(&settings.redis)?;
    }
    validate_timers_config(&settings.timers)?;
    validate_routing_config(&settings.routing)?;
    validate_transcription_config(&settings.transcription)?;
    validate_logging_config(&settings.logging)?;

    Ok(())
}

/// Validate bot configuration
fn validate_bot_config(config: &super::BotConfig) -> Result<()> {
    if config.token.is_empty() {
        return Err(DietBuddyError::Config(
            "Bot token is required".to_string()
        ));
    }

    Ok(())
}

/// Validate Redis configuration
fn validate_redis_config(config: &super::RedisConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(DietBuddyError::Config(
            "Redis URL is required".to_string()
        ));
    }

    if config.ttl_seconds == Some(0) {
        return Err(DietBuddyError::Config(
            "Redis TTL must be greater than 0 when set".to_string()
        ));
    }

    Ok(())
}

/// Validate timer configuration
fn validate_timers_config(config: &super::TimersConfig) -> Result<()> {
    if config.no_reply_ms == 0 {
        return Err(DietBuddyError::Config(
            "No-reply delay must be greater than 0".to_string()
        ));
    }

    for (name, secs) in &config.state_timeouts {
        if State::from_config_key(name).is_invalid() {
            return Err(DietBuddyError::Config(
                format!("Unknown state in timeout overrides: {}", name)
            ));
        }
        if *secs == 0 {
            return Err(DietBuddyError::Config(
                format!("Timeout for {} must be greater than 0", name)
            ));
        }
    }

    Ok(())
}

/// Validate routing configuration
fn validate_routing_config(config: &super::RoutingConfig) -> Result<()> {
    if config.allow_state_override && config.override_prefix.trim().is_empty() {
        return Err(DietBuddyError::Config(
            "State override prefix cannot be empty".to_string()
        ));
    }

    if config.lane_idle_seconds == 0 {
        return Err(DietBuddyError::Config(
            "Router lane idle time must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate transcription configuration
fn validate_transcription_config(config: &super::TranscriptionConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    url::Url::parse(&config.endpoint)?;

    if config.timeout_seconds == 0 {
        return Err(DietBuddyError::Config(
            "Transcription timeout must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(DietBuddyError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(DietBuddyError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}
