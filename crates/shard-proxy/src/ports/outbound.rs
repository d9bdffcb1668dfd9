//! # Outbound Ports
//!
//! Traits for external dependencies: the HTTP client talking to observer
//! nodes and the source of truth for the observer topology.

use crate::domain::{HttpMethod, NodeRole, ObserverNode, RequestDescriptor};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// One HTTP exchange to forward to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    /// Method
    pub method: HttpMethod,
    /// Path with query string
    pub path: String,
    /// JSON body
    pub body: Option<Value>,
}

impl From<&RequestDescriptor> for BackendRequest {
    fn from(descriptor: &RequestDescriptor) -> Self {
        Self {
            method: descriptor.method,
            path: descriptor.path.clone(),
            body: descriptor.body.clone(),
        }
    }
}

/// Raw node answer; the payload schema is not interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    /// HTTP status
    pub status: u16,
    /// Raw body
    pub body: String,
}

/// Transport-level failure (the node never produced a status).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Attempt timed out
    #[error("Request timed out")]
    Timeout,
    /// Connection could not be established
    #[error("Connection failed: {0}")]
    Connect(String),
    /// Request could not be sent
    #[error("Request failed: {0}")]
    Request(String),
    /// Response body could not be read
    #[error("Body read failed: {0}")]
    Body(String),
}

/// Backend client - outbound port.
///
/// Performs a single call to one node. Retries and timeouts across calls
/// belong to the dispatcher.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Execute one request against one node.
    async fn execute(
        &self,
        node: &ObserverNode,
        request: &BackendRequest,
    ) -> Result<BackendResponse, TransportError>;
}

/// Topology source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TopologyError {
    /// Source could not be read
    #[error("Topology source unavailable: {0}")]
    Unavailable(String),
    /// Source content could not be parsed
    #[error("Topology source malformed: {0}")]
    Malformed(String),
}

/// Topology source - outbound port.
#[async_trait]
pub trait TopologySource: Send + Sync {
    /// Current node list for a role.
    async fn load(&self, role: NodeRole) -> Result<Vec<ObserverNode>, TopologyError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Scripted reply of the mock backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Answer with a status and body
    Respond {
        /// Status
        status: u16,
        /// Body
        body: String,
    },
    /// Fail at transport level
    Fail(TransportError),
}

impl MockReply {
    /// JSON answer.
    pub fn json(status: u16, body: Value) -> Self {
        MockReply::Respond {
            status,
            body: body.to_string(),
        }
    }

    /// Observer-style `{ data, error, code }` success envelope.
    pub fn data(data: Value) -> Self {
        Self::json(
            200,
            serde_json::json!({ "data": data, "error": "", "code": "successful" }),
        )
    }
}

/// One recorded call to the mock backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// Node URL
    pub url: String,
    /// Method
    pub method: HttpMethod,
    /// Path
    pub path: String,
    /// Body
    pub body: Option<Value>,
}

#[derive(Default)]
struct MockState {
    routes: HashMap<(String, String), MockReply>,
    node_defaults: HashMap<String, MockReply>,
    delays: HashMap<String, Duration>,
    calls: Vec<MockCall>,
    completed: usize,
}

/// Mock backend for testing.
///
/// Replies are looked up by (url, path), then by url, and default to a 404
/// `not found` envelope. Every call is recorded before the reply is produced;
/// it counts as completed only once its delay has elapsed, so calls cancelled
/// mid-flight show up in `calls()` but not in `completed_calls()`.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    /// Empty mock: every node answers 404.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the reply of one node for one path.
    pub fn on(&self, url: &str, path: &str, reply: MockReply) -> &Self {
        self.state
            .lock()
            .routes
            .insert((url.to_string(), path.to_string()), reply);
        self
    }

    /// Script the reply of one node for every unscripted path.
    pub fn on_any(&self, url: &str, reply: MockReply) -> &Self {
        self.state.lock().node_defaults.insert(url.to_string(), reply);
        self
    }

    /// Make one node refuse connections.
    pub fn down(&self, url: &str) -> &Self {
        self.on_any(url, MockReply::Fail(TransportError::Connect("connection refused".into())))
    }

    /// Delay every reply of one node.
    pub fn delay(&self, url: &str, delay: Duration) -> &Self {
        self.state.lock().delays.insert(url.to_string(), delay);
        self
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Recorded calls to one node.
    pub fn calls_to(&self, url: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| c.url == url).count()
    }

    /// Total recorded calls.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Calls that ran to the end of their delay and produced a reply.
    pub fn completed_calls(&self) -> usize {
        self.state.lock().completed
    }

    /// Forget recorded calls (scripts are kept).
    pub fn clear_calls(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.completed = 0;
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn execute(
        &self,
        node: &ObserverNode,
        request: &BackendRequest,
    ) -> Result<BackendResponse, TransportError> {
        let (reply, delay) = {
            let mut state = self.state.lock();
            state.calls.push(MockCall {
                url: node.url.clone(),
                method: request.method,
                path: request.path.clone(),
                body: request.body.clone(),
            });
            let reply = state
                .routes
                .get(&(node.url.clone(), request.path.clone()))
                .or_else(|| state.node_defaults.get(&node.url))
                .cloned()
                .unwrap_or_else(|| {
                    MockReply::json(
                        404,
                        serde_json::json!({ "data": null, "error": "not found", "code": "not_found" }),
                    )
                });
            (reply, state.delays.get(&node.url).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().completed += 1;

        match reply {
            MockReply::Respond { status, body } => Ok(BackendResponse { status, body }),
            MockReply::Fail(err) => Err(err),
        }
    }
}

/// In-memory topology source for testing.
#[derive(Default)]
pub struct StaticTopologySource {
    nodes: RwLock<HashMap<NodeRole, Vec<ObserverNode>>>,
    failure: RwLock<Option<TopologyError>>,
}

impl StaticTopologySource {
    /// Source serving `nodes` for the regular role.
    pub fn new(nodes: Vec<ObserverNode>) -> Self {
        let source = Self::default();
        source.set(NodeRole::Regular, nodes);
        source
    }

    /// Replace the node list served for a role.
    pub fn set(&self, role: NodeRole, nodes: Vec<ObserverNode>) {
        self.nodes.write().insert(role, nodes);
    }

    /// Make every load fail with `err` (`None` restores normal behaviour).
    pub fn fail_with(&self, err: Option<TopologyError>) {
        *self.failure.write() = err;
    }
}

#[async_trait]
impl TopologySource for StaticTopologySource {
    async fn load(&self, role: NodeRole) -> Result<Vec<ObserverNode>, TopologyError> {
        if let Some(err) = self.failure.read().clone() {
            return Err(err);
        }
        Ok(self.nodes.read().get(&role).cloned().unwrap_or_default())
    }
}
