//! Test context for unified test setup
//!
//! Wires the real services around an in-memory store, a recording channel
//! and a scripted transcriber.

use std::sync::Arc;
use std::time::Duration;
use DietBuddy::config::{InvalidStatePolicy, Settings, StorageBackend};
use DietBuddy::models::State;
use DietBuddy::services::{ServiceFactory, Transcriber};
use DietBuddy::state::{MemoryStateStore, SessionStateMachine};

use super::doubles::{RecordingChannel, ScriptedAgent, ScriptedTranscriber};

/// Configuration of a test context
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub transcript: Option<String>,
    pub invalid_state_policy: InvalidStatePolicy,
    pub admin_ids: Vec<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            transcript: Some("recommendation".to_string()),
            invalid_state_policy: InvalidStatePolicy::TreatAsActive,
            admin_ids: vec![],
        }
    }
}

/// Unified test context that manages all test components
pub struct TestContext {
    pub services: ServiceFactory,
    pub channel: Arc<RecordingChannel>,
    pub store: Arc<MemoryStateStore>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::new_with_config(TestConfig::default())
    }

    pub fn new_with_config(config: TestConfig) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let settings = Self::create_test_settings(&config);
        let store = Arc::new(MemoryStateStore::new());
        let channel = RecordingChannel::new();
        let transcriber: Arc<dyn Transcriber> = match &config.transcript {
            Some(text) => ScriptedTranscriber::returning(text),
            None => ScriptedTranscriber::failing(),
        };

        let services = ServiceFactory::new(settings, store.clone(), channel.clone(), transcriber)
            .expect("Failed to create services");

        Self { services, channel, store }
    }

    fn create_test_settings(config: &TestConfig) -> Settings {
        let mut settings = Settings::default();
        settings.bot.token = "12345:test_token".to_string();
        settings.bot.admin_ids = config.admin_ids.clone();
        settings.storage.backend = StorageBackend::Memory;
        settings.routing.invalid_state_policy = config.invalid_state_policy;
        settings.transcription.notices = true;
        settings
    }

    pub fn machine(&self) -> &SessionStateMachine {
        &self.services.machine
    }

    /// Subscribe a scripted agent and keep a handle on it
    pub fn agent(&self, agent: ScriptedAgent) -> Arc<ScriptedAgent> {
        let agent = Arc::new(agent);
        self.services.subscribe_agent(agent.clone());
        agent
    }

    pub async fn text(&self, user_id: &str, text: &str) {
        self.services
            .orchestrator
            .handle_text(user_id, &uuid::Uuid::new_v4().to_string(), text)
            .await
            .expect("Failed to handle text");
    }

    pub async fn state(&self, user_id: &str) -> State {
        self.machine().get_state(user_id).await.expect("Failed to read state")
    }

    /// Let router lanes drain without reaching any timer
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.services.shutdown();
    }
}
