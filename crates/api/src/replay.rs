//! File-backed client replaying a recorded daemon session.
//!
//! A session file is JSON lines. Each line is one of:
//! - `{"snapshot": {"containers": {...}, "images": {...}}}`: state before the stream starts
//! - a [`ClientEvent`], e.g. `{"event":"container-changed","id":"c1","payload":{...}}`
//! - `{"info": {"Driver": ..., "DriverStatus": [...]}}`: info reported from this point on
//!
//! Snapshot lines are folded in at load time; event and info lines are
//! replayed in file order once a subscriber attaches.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use dockview_core::{ClientEvent, ContainerInfo, DaemonInfo, EntityId, ImageInfo};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{lock, CancelHandle, ClientState, DaemonClient, DockviewError, DockviewResult, StreamHandle};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SessionLine {
    Event(ClientEvent),
    Snapshot { snapshot: ClientState },
    Info { info: DaemonInfo },
}

#[derive(Debug, Clone)]
enum Step {
    Event(ClientEvent),
    Info(DaemonInfo),
}

struct ReplayInner {
    state: ClientState,
    info: Option<DaemonInfo>,
}

pub struct ReplayClient {
    inner: Arc<Mutex<ReplayInner>>,
    steps: Vec<Step>,
    event_delay: Duration,
    queue_cap: usize,
}

impl ReplayClient {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading session file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing session file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut state = ClientState::default();
        let mut info = None;
        let mut steps = Vec::new();
        let mut streaming = false;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed: SessionLine = serde_json::from_str(line)
                .with_context(|| format!("line {}: not a snapshot, event or info record", lineno + 1))?;
            match parsed {
                SessionLine::Snapshot { snapshot } => {
                    if streaming {
                        anyhow::bail!("line {}: snapshot after events", lineno + 1);
                    }
                    state.containers.extend(snapshot.containers);
                    state.images.extend(snapshot.images);
                }
                // Info before the first event is the initial answer.
                SessionLine::Info { info: i } if !streaming => info = Some(i),
                SessionLine::Info { info: i } => steps.push(Step::Info(i)),
                SessionLine::Event(ev) => {
                    streaming = true;
                    steps.push(Step::Event(ev));
                }
            }
        }
        info!(containers = state.containers.len(), images = state.images.len(), steps = steps.len(), "replay: session loaded");
        Ok(Self {
            inner: Arc::new(Mutex::new(ReplayInner { state, info })),
            steps,
            event_delay: Duration::ZERO,
            queue_cap: 2048,
        })
    }

    /// Pause between replayed events.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    pub fn with_queue_cap(mut self, cap: usize) -> Self {
        self.queue_cap = cap.max(1);
        self
    }

    pub fn event_count(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, Step::Event(_))).count()
    }
}

#[async_trait::async_trait]
impl DaemonClient for ReplayClient {
    fn containers(&self) -> HashMap<EntityId, ContainerInfo> { lock(&self.inner).state.containers.clone() }

    fn images(&self) -> HashMap<EntityId, ImageInfo> { lock(&self.inner).state.images.clone() }

    async fn query_info(&self) -> DockviewResult<DaemonInfo> {
        lock(&self.inner)
            .info
            .clone()
            .ok_or_else(|| DockviewError::NotFound("session has no info record yet".into()))
    }

    async fn subscribe(&self) -> DockviewResult<StreamHandle<ClientEvent>> {
        let (tx, rx) = mpsc::channel::<ClientEvent>(self.queue_cap);
        let steps = self.steps.clone();
        let inner = Arc::clone(&self.inner);
        let delay = self.event_delay;
        let task = tokio::spawn(async move {
            let mut sent = 0usize;
            for step in steps {
                match step {
                    Step::Info(i) => {
                        debug!(driver = %i.driver, "replay: info updated");
                        lock(&inner).info = Some(i);
                    }
                    Step::Event(ev) => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        lock(&inner).state.apply(&ev);
                        if tx.send(ev).await.is_err() {
                            break;
                        }
                        sent += 1;
                    }
                }
            }
            info!(sent, "replay: stream finished");
        });
        Ok(StreamHandle { rx, cancel: CancelHandle::new(Some(task)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = r#"
# containers and images present at startup
{"snapshot": {"containers": {"c1": {"Name": "/web"}}, "images": {"i1": {"RepoTags": ["nginx:latest"], "Created": 1}}}}
{"info": {"Driver": "devicemapper", "DriverStatus": [["Data Space Used", "1 GB"], ["Data Space Total", "10 GB"]]}}
{"event": "container-changed", "id": "c2", "payload": {"Name": "/db"}}
{"info": {"Driver": "devicemapper", "DriverStatus": [["Data Space Used", "2 GB"], ["Data Space Total", "10 GB"]]}}
{"event": "activity-changed"}
{"event": "container-changed", "id": "c1", "payload": null}
"#;

    #[test]
    fn parse_splits_snapshot_and_steps() {
        let client = ReplayClient::parse(SESSION).unwrap();
        assert_eq!(client.containers().len(), 1);
        assert_eq!(client.images().len(), 1);
        assert_eq!(client.event_count(), 3);
    }

    #[test]
    fn parse_rejects_garbage_with_line_number() {
        let err = ReplayClient::parse("{\"nope\": 1}").err().unwrap();
        assert!(format!("{:#}", err).contains("line 1"));
    }

    #[tokio::test]
    async fn replay_updates_state_and_info_in_order() {
        let client = ReplayClient::parse(SESSION).unwrap();
        assert_eq!(client.query_info().await.unwrap().status_value("Data Space Used"), Some("1 GB"));
        let mut stream = client.subscribe().await.unwrap();
        let mut kinds = Vec::new();
        while let Some(ev) = stream.rx.recv().await {
            kinds.push(ev.kind());
        }
        assert_eq!(kinds, vec!["container-changed", "activity-changed", "container-changed"]);
        let containers = client.containers();
        assert!(containers.contains_key("c2"));
        assert!(!containers.contains_key("c1"));
        assert_eq!(client.query_info().await.unwrap().status_value("Data Space Used"), Some("2 GB"));
    }
}
