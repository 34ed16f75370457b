//! State storage implementation
//!
//! This module persists the `user id -> state name` mapping. Redis is the
//! production backend; the in-memory store serves tests and single-process
//! deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use tracing::{debug, error};
use crate::config::RedisConfig;
use crate::utils::errors::Result;

/// Key-value persistence of user states
///
/// Only single-key atomicity is assumed; callers serialize writes per user.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Stored state name, `None` when the user was never written
    async fn get(&self, user_id: &str) -> Result<Option<String>>;

    /// Persist a state name
    async fn set(&self, user_id: &str, state_name: &str) -> Result<()>;

    /// Check that the backend is reachable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Redis-based state store
#[derive(Clone)]
pub struct RedisStateStore {
    /// Redis connection manager
    connection_manager: redis::aio::ConnectionManager,
    /// Redis configuration
    config: RedisConfig,
}

impl RedisStateStore {
    /// Create a new Redis state store
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let connection_manager = redis::aio::ConnectionManager::new(client).await?;

        Ok(Self {
            connection_manager,
            config,
        })
    }

    /// Get the Redis key for a user's state
    fn state_key(&self, user_id: &str) -> String {
        format!("{}state:{}", self.config.prefix, user_id)
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, user_id: &str) -> Result<Option<String>> {
        let key = self.state_key(user_id);
        let mut conn = self.connection_manager.clone();

        match conn.get::<&str, Option<String>>(&key).await {
            Ok(value) => {
                debug!(user_id = user_id, key = %key, has_value = value.is_some(), "Redis GET result");
                Ok(value)
            }
            Err(e) => {
                error!(user_id = user_id, error = %e, "Failed to read state from Redis");
                Err(e.into())
            }
        }
    }

    async fn set(&self, user_id: &str, state_name: &str) -> Result<()> {
        let key = self.state_key(user_id);
        let mut conn = self.connection_manager.clone();

        let result = match self.config.ttl_seconds {
            Some(ttl) => conn.set_ex::<_, _, ()>(&key, state_name, ttl).await,
            None => conn.set::<_, _, ()>(&key, state_name).await,
        };

        match result {
            Ok(()) => {
                debug!(user_id = user_id, state = state_name, "State saved to Redis");
                Ok(())
            }
            Err(e) => {
                error!(user_id = user_id, error = %e, "Failed to save state to Redis");
                Err(e.into())
            }
        }
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// In-memory state store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: DashMap<String, String>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a stored state
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.states.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn set(&self, user_id: &str, state_name: &str) -> Result<()> {
        self.states.insert(user_id.to_string(), state_name.to_string());
        Ok(())
    }
}
