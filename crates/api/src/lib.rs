//! Dockview daemon client facade.
//!
//! The overview consumes the container daemon only through [`DaemonClient`]:
//! synchronous snapshots of the current collections, an async info query and
//! a stream of change events. Implementations here are in-memory ([`MockClient`])
//! and file-backed ([`ReplayClient`]); a socket-backed client plugs in the same way.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use dockview_core::{ClientEvent, ContainerInfo, DaemonInfo, EntityId, ImageInfo};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub mod replay;

pub use replay::ReplayClient;

/// Client errors suitable for transport over RPC later.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DockviewError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type DockviewResult<T> = Result<T, DockviewError>;

impl From<dockview_core::CoreError> for DockviewError {
    fn from(e: dockview_core::CoreError) -> Self { DockviewError::Decode(e.to_string()) }
}

/// Black-box daemon client.
#[async_trait::async_trait]
pub trait DaemonClient: Send + Sync {
    /// Current containers keyed by id.
    fn containers(&self) -> HashMap<EntityId, ContainerInfo>;

    /// Current images keyed by id.
    fn images(&self) -> HashMap<EntityId, ImageInfo>;

    /// Storage driver info (driver name plus `[label, value]` status pairs).
    async fn query_info(&self) -> DockviewResult<DaemonInfo>;

    /// Stream change events from now on.
    async fn subscribe(&self) -> DockviewResult<StreamHandle<ClientEvent>>;
}

// ----------------- Streaming primitives -----------------

/// Cancellation handle that aborts the underlying task.
pub struct CancelHandle { task: Option<tokio::task::JoinHandle<()>> }

impl CancelHandle {
    pub fn new(task: Option<tokio::task::JoinHandle<()>>) -> Self { Self { task } }

    pub fn cancel(mut self) { if let Some(h) = self.task.take() { h.abort(); } }
}

/// Generic stream handle used by streaming endpoints.
pub struct StreamHandle<T> { pub rx: mpsc::Receiver<T>, pub cancel: CancelHandle }

// ----------------- Shared collection state -----------------

/// The client's own mirror of daemon collections, updated before an event
/// is emitted so snapshots never lag the stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default)]
    pub containers: HashMap<EntityId, ContainerInfo>,
    #[serde(default)]
    pub images: HashMap<EntityId, ImageInfo>,
}

impl ClientState {
    pub fn apply(&mut self, ev: &ClientEvent) {
        match ev {
            ClientEvent::ContainerChanged { id, payload: Some(c) } => { self.containers.insert(id.clone(), c.clone()); }
            ClientEvent::ContainerChanged { id, payload: None } => { self.containers.remove(id); }
            ClientEvent::ImageChanged { id, payload: Some(i) } => { self.images.insert(id.clone(), i.clone()); }
            ClientEvent::ImageChanged { id, payload: None } => { self.images.remove(id); }
            ClientEvent::ActivityChanged => {}
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ----------------- Mock implementation -----------------

struct MockInner {
    state: ClientState,
    info: DockviewResult<DaemonInfo>,
    info_calls: usize,
    subscribers: Vec<mpsc::Sender<ClientEvent>>,
}

/// Simple in-memory implementation for tests.
#[derive(Clone)]
pub struct MockClient { inner: Arc<Mutex<MockInner>> }

impl Default for MockClient {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockInner {
                state: ClientState::default(),
                info: Err(DockviewError::NotFound("no info configured".into())),
                info_calls: 0,
                subscribers: Vec::new(),
            })),
        }
    }
}

impl MockClient {
    pub fn new() -> Self { Self::default() }

    pub fn with_state(state: ClientState) -> Self {
        let me = Self::default();
        lock(&me.inner).state = state;
        me
    }

    pub fn set_info(&self, info: DockviewResult<DaemonInfo>) { lock(&self.inner).info = info; }

    pub fn info_calls(&self) -> usize { lock(&self.inner).info_calls }

    /// Update the mirrored collections and deliver `ev` to every subscriber.
    pub fn emit(&self, ev: ClientEvent) {
        let mut g = lock(&self.inner);
        g.state.apply(&ev);
        g.subscribers.retain(|tx| !tx.is_closed());
        for tx in g.subscribers.iter() {
            if tx.try_send(ev.clone()).is_err() {
                debug!(kind = ev.kind(), "mock: subscriber full; event dropped");
            }
        }
    }
}

#[async_trait::async_trait]
impl DaemonClient for MockClient {
    fn containers(&self) -> HashMap<EntityId, ContainerInfo> { lock(&self.inner).state.containers.clone() }

    fn images(&self) -> HashMap<EntityId, ImageInfo> { lock(&self.inner).state.images.clone() }

    async fn query_info(&self) -> DockviewResult<DaemonInfo> {
        let mut g = lock(&self.inner);
        g.info_calls += 1;
        g.info.clone()
    }

    async fn subscribe(&self) -> DockviewResult<StreamHandle<ClientEvent>> {
        let (tx, rx) = mpsc::channel(1024);
        let mut g = lock(&self.inner);
        g.subscribers.push(tx);
        info!(subscribers = g.subscribers.len(), "mock: subscribed");
        Ok(StreamHandle { rx, cancel: CancelHandle::new(None) })
    }
}
