//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use std::collections::HashMap;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub bot: BotConfig,
    pub storage: StorageConfig,
    pub redis: RedisConfig,
    pub timers: TimersConfig,
    pub routing: RoutingConfig,
    pub transcription: TranscriptionConfig,
    pub logging: LoggingConfig,
}

/// Telegram bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    pub token: String,
    /// Users allowed to force states; empty means everyone
    #[serde(default)]
    pub admin_ids: Vec<String>,
}

/// Where user states are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Redis,
    Memory,
}

/// State store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub url: String,
    pub prefix: String,
    /// Expiry for stored states; states never expire when unset
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

/// Timer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimersConfig {
    /// Delay before the no-reply fallback answers
    pub no_reply_ms: u64,
    /// Per-state timeout overrides in seconds, keyed by state name
    #[serde(default)]
    pub state_timeouts: HashMap<String, u64>,
}

/// How to dispatch text for users whose stored state is unreadable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidStatePolicy {
    /// Call the idle classifier directly, like `Idle`
    TreatAsIdle,
    /// Publish on the router, like any other non-idle state
    TreatAsActive,
}

/// Routing and command configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    pub invalid_state_policy: InvalidStatePolicy,
    pub override_prefix: String,
    pub allow_state_override: bool,
    /// Idle time after which a user's router lane is released
    #[serde(default = "default_lane_idle_seconds")]
    pub lane_idle_seconds: u64,
}

fn default_lane_idle_seconds() -> u64 {
    60
}

impl RoutingConfig {
    pub fn lane_idle(&self) -> Duration {
        Duration::from_secs(self.lane_idle_seconds)
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscriptionConfig {
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    /// Send progress and "RECOGNIZED:" notices around transcription
    pub notices: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: String,
}

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("DIETBUDDY").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Load settings from a specific file, without environment overrides
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::with_name(path).required(true))
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), crate::utils::errors::DietBuddyError> {
        super::validation::validate_settings(self)
    }
}

impl TimersConfig {
    pub fn no_reply_delay(&self) -> Duration {
        Duration::from_millis(self.no_reply_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                token: String::new(),
                admin_ids: vec![],
            },
            storage: StorageConfig {
                backend: StorageBackend::Redis,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                prefix: "dietbuddy:".to_string(),
                ttl_seconds: None,
            },
            timers: TimersConfig {
                no_reply_ms: 1000,
                state_timeouts: HashMap::new(),
            },
            routing: RoutingConfig {
                invalid_state_policy: InvalidStatePolicy::TreatAsActive,
                override_prefix: "$$$".to_string(),
                allow_state_override: true,
                lane_idle_seconds: default_lane_idle_seconds(),
            },
            transcription: TranscriptionConfig {
                enabled: false,
                endpoint: "http://localhost:9000/transcribe".to_string(),
                api_key: None,
                timeout_seconds: 30,
                notices: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: "logs".to_string(),
            },
        }
    }
}
