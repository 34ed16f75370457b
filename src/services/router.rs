//! Message router
//!
//! A typed publish/subscribe hub with two disjoint channels: routing messages
//! toward dialogue-step agents, and display messages toward the channel
//! relay. Every user gets one lightweight worker per channel fed by an
//! unbounded queue, so publishing never blocks and messages for one user are
//! dispatched in publish order. Users do not wait on each other. A worker
//! that stays idle retires its lane; the next publish starts a fresh one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use crate::models::{DisplayMessage, MessageKind, RoutingMessage, State};
use crate::utils::errors::Result;

/// Dialogue-step handler subscribed to routing messages
#[async_trait]
pub trait Agent: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// States this agent serves
    fn states(&self) -> &[State];

    /// Eligibility predicate; by default any kind in a served state
    fn accepts(&self, _kind: MessageKind, state: State) -> bool {
        self.states().contains(&state)
    }

    /// Handle one message; replies go out through the router
    async fn consume(&self, message: RoutingMessage) -> Result<()>;
}

/// Receiver of outbound display messages
#[async_trait]
pub trait DisplaySink: Send + Sync {
    async fn deliver(&self, message: DisplayMessage) -> Result<()>;
}

/// How long a user's lane worker waits for work before retiring
pub const DEFAULT_LANE_IDLE: Duration = Duration::from_secs(60);

type AgentList = Arc<RwLock<Vec<Arc<dyn Agent>>>>;
type SinkList = Arc<RwLock<Vec<Arc<dyn DisplaySink>>>>;
type LaneMap<M> = Arc<DashMap<String, Lane<M>>>;

/// Queue feeding one user's worker
struct Lane<M> {
    id: u64,
    tx: mpsc::UnboundedSender<M>,
}

/// Publish/subscribe hub between the orchestrator and the agents
#[derive(Clone)]
pub struct MessageRouter {
    agents: AgentList,
    sinks: SinkList,
    inbound: LaneMap<RoutingMessage>,
    outbound: LaneMap<DisplayMessage>,
    next_lane: Arc<AtomicU64>,
    idle: Duration,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::with_idle_timeout(DEFAULT_LANE_IDLE)
    }

    pub fn with_idle_timeout(idle: Duration) -> Self {
        Self {
            agents: Arc::new(RwLock::new(Vec::new())),
            sinks: Arc::new(RwLock::new(Vec::new())),
            inbound: Arc::new(DashMap::new()),
            outbound: Arc::new(DashMap::new()),
            next_lane: Arc::new(AtomicU64::new(0)),
            idle,
        }
    }

    /// Register a dialogue-step agent
    pub fn subscribe_agent(&self, agent: Arc<dyn Agent>) {
        info!(agent = agent.name(), states = ?agent.states(), "Agent subscribed");
        self.agents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(agent);
    }

    /// Register a display sink; it receives every display message
    pub fn subscribe_display(&self, sink: Arc<dyn DisplaySink>) {
        self.sinks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(sink);
    }

    pub fn agent_count(&self) -> usize {
        self.agents.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Number of live per-user lanes across both channels
    pub fn active_lanes(&self) -> usize {
        self.inbound.len() + self.outbound.len()
    }

    /// Queue a routing message for the agents serving its state
    pub fn publish(&self, message: RoutingMessage) {
        debug!(user_id = %message.user_id, kind = message.kind.as_str(), state = %message.state, "Publishing routing message");
        let agents = self.agents.clone();
        let lane = self.inbound.entry(message.user_id.clone()).or_insert_with(|| {
            self.spawn_lane(&self.inbound, message.user_id.clone(), move |msg| dispatch_routing(agents.clone(), msg))
        });
        if lane.tx.send(message).is_err() {
            warn!("Routing lane closed, message dropped");
        }
    }

    /// Queue a display message for the sinks
    pub fn publish_display(&self, message: DisplayMessage) {
        debug!(user_id = %message.user_id, items = message.items.len(), fallback = message.fallback, "Publishing display message");
        let sinks = self.sinks.clone();
        let lane = self.outbound.entry(message.user_id.clone()).or_insert_with(|| {
            self.spawn_lane(&self.outbound, message.user_id.clone(), move |msg| dispatch_display(sinks.clone(), msg))
        });
        if lane.tx.send(message).is_err() {
            warn!("Display lane closed, message dropped");
        }
    }

    /// Spawn the worker draining one user's queue
    ///
    /// The worker removes its own entry once it has been idle for the
    /// configured time. Removal happens under the entry's shard lock and only
    /// while the queue is empty, so no published message is lost or
    /// overtaken by a successor lane.
    fn spawn_lane<M, F, Fut>(&self, lanes: &LaneMap<M>, user_id: String, dispatch: F) -> Lane<M>
    where
        M: Send + 'static,
        F: Fn(M) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let id = self.next_lane.fetch_add(1, Ordering::Relaxed);
        let idle = self.idle;
        let lanes = lanes.clone();
        let (tx, mut rx) = mpsc::unbounded_channel::<M>();

        tokio::spawn(async move {
            debug!(user_id = %user_id, lane = id, "Router lane started");
            loop {
                let next = tokio::time::timeout(idle, rx.recv()).await;
                match next {
                    Ok(Some(message)) => dispatch(message).await,
                    Ok(None) => break,
                    Err(_) => {
                        let mut late = None;
                        let retired = lanes
                            .remove_if(&user_id, |_, lane| {
                                if lane.id != id {
                                    return false;
                                }
                                match rx.try_recv() {
                                    Ok(message) => {
                                        late = Some(message);
                                        false
                                    }
                                    Err(_) => true,
                                }
                            })
                            .is_some();
                        if let Some(message) = late {
                            dispatch(message).await;
                        } else if retired {
                            break;
                        }
                    }
                }
            }
            debug!(user_id = %user_id, lane = id, "Router lane stopped");
        });

        Lane { id, tx }
    }

    /// Drop all lanes and subscribers; workers exit once their queues drain
    pub fn shutdown(&self) {
        self.inbound.clear();
        self.outbound.clear();
        self.agents.write().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
        self.sinks.write().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
        info!("Message router shut down");
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch_routing(agents: AgentList, message: RoutingMessage) {
    let eligible: Vec<Arc<dyn Agent>> = agents
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .iter()
        .filter(|agent| agent.accepts(message.kind, message.state))
        .cloned()
        .collect();

    if eligible.is_empty() {
        debug!(user_id = %message.user_id, state = %message.state, kind = message.kind.as_str(), "No agent serves this message");
        return;
    }

    for agent in eligible {
        if let Err(e) = agent.consume(message.clone()).await {
            error!(agent = agent.name(), user_id = %message.user_id, error = %e, severity = %e.severity(), "Agent failed to handle message");
        }
    }
}

async fn dispatch_display(sinks: SinkList, message: DisplayMessage) {
    let sinks: Vec<Arc<dyn DisplaySink>> = sinks
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();

    for sink in sinks {
        if let Err(e) = sink.deliver(message.clone()).await {
            if e.is_recoverable() {
                warn!(user_id = %message.user_id, error = %e, "Display delivery failed");
            } else {
                error!(user_id = %message.user_id, error = %e, severity = %e.severity(), "Display delivery failed");
            }
        }
    }
}
