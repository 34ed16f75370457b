//! Services module
//!
//! This module contains the runtime services and the factory wiring them

pub mod channel;
pub mod no_reply;
pub mod router;
pub mod transcription;

// Re-export commonly used services
pub use channel::{ChannelAdapter, TelegramChannel};
pub use no_reply::NoReplyFallback;
pub use router::{Agent, DisplaySink, MessageRouter};
pub use transcription::{DisabledTranscriber, HttpTranscriber, Transcriber};

use std::sync::Arc;
use tracing::info;
use crate::config::settings::{Settings, StorageBackend, TranscriptionConfig};
use crate::handlers::classifier::IntentClassifier;
use crate::handlers::controller::{Orchestrator, OrchestratorOptions};
use crate::models::TransitionTable;
use crate::state::machine::SessionStateMachine;
use crate::state::storage::{MemoryStateStore, RedisStateStore, StateStore};
use crate::utils::errors::Result;

/// Service factory for creating and wiring all services
#[derive(Clone)]
pub struct ServiceFactory {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn StateStore>,
    pub router: MessageRouter,
    pub machine: SessionStateMachine,
    pub no_reply: NoReplyFallback,
    pub orchestrator: Arc<Orchestrator>,
}

impl ServiceFactory {
    /// Create a new ServiceFactory with all services initialized
    ///
    /// The orchestrator is subscribed as the display sink and the intent
    /// classifier as the `Idle` agent.
    pub fn new(
        settings: Settings,
        store: Arc<dyn StateStore>,
        channel: Arc<dyn ChannelAdapter>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Result<Self> {
        let table = TransitionTable::with_overrides(&settings.timers.state_timeouts)?;
        let router = MessageRouter::with_idle_timeout(settings.routing.lane_idle());
        let machine = SessionStateMachine::new(store.clone(), router.clone(), table);
        let no_reply = NoReplyFallback::new(machine.clone(), settings.timers.no_reply_delay());

        let classifier: Arc<dyn Agent> = Arc::new(IntentClassifier::new(machine.clone())?);
        let options = OrchestratorOptions {
            routing: settings.routing.clone(),
            admin_ids: settings.bot.admin_ids.clone(),
            transcription_notices: settings.transcription.notices,
        };
        let orchestrator = Arc::new(Orchestrator::new(
            machine.clone(),
            no_reply.clone(),
            classifier.clone(),
            channel,
            transcriber,
            options,
        ));

        router.subscribe_display(orchestrator.clone());
        router.subscribe_agent(classifier);

        Ok(Self {
            settings: Arc::new(settings),
            store,
            router,
            machine,
            no_reply,
            orchestrator,
        })
    }

    /// Register a dialogue-step agent
    pub fn subscribe_agent(&self, agent: Arc<dyn Agent>) {
        self.router.subscribe_agent(agent);
    }

    /// Health check for all services
    pub async fn health_check(&self) -> ServiceHealthStatus {
        let store_healthy = self.store.health_check().await.is_ok();

        ServiceHealthStatus {
            store_healthy,
            transcription_enabled: self.settings.transcription.enabled,
            agents: self.router.agent_count(),
            pending_timeouts: self.machine.pending_timeouts(),
            active_lanes: self.router.active_lanes(),
        }
    }

    /// Stop all timers and router lanes
    pub fn shutdown(&self) {
        self.no_reply.cancel_all();
        self.machine.shutdown();
        self.router.shutdown();
        info!("Services shut down");
    }
}

/// Open the state store selected in the settings
pub async fn create_state_store(settings: &Settings) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match settings.storage.backend {
        StorageBackend::Redis => Arc::new(RedisStateStore::new(settings.redis.clone()).await?),
        StorageBackend::Memory => Arc::new(MemoryStateStore::new()),
    };
    Ok(store)
}

/// Build the transcriber selected in the settings
pub fn create_transcriber(config: &TranscriptionConfig) -> Result<Arc<dyn Transcriber>> {
    if config.enabled {
        Ok(Arc::new(HttpTranscriber::new(config)?))
    } else {
        Ok(Arc::new(DisabledTranscriber))
    }
}

/// Health status for all services
#[derive(Debug, Clone)]
pub struct ServiceHealthStatus {
    pub store_healthy: bool,
    pub transcription_enabled: bool,
    pub agents: usize,
    pub pending_timeouts: usize,
    pub active_lanes: usize,
}

impl ServiceHealthStatus {
    /// Check if all critical services are healthy
    pub fn is_healthy(&self) -> bool {
        self.store_healthy
    }

    /// Get list of unhealthy services
    pub fn get_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.store_healthy {
            issues.push("State store unreachable".to_string());
        }
        if self.agents <= 1 {
            issues.push("No dialogue agents besides the intent classifier".to_string());
        }

        issues
    }
}
