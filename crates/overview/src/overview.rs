#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use dockview_api::{CancelHandle, DaemonClient, DockviewResult, StreamHandle};
use dockview_core::{ClientEvent, DaemonInfo};
use dockview_store::{Change, ContainerProjection, ImageProjection, Reconciler};
use metrics::{counter, gauge, histogram};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::OverviewConfig;
use crate::model::{OverviewEvent, OverviewView, ViewSnapshot};
use crate::storage::{self, UsageDisplay};
use crate::throttle::Throttle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Read side: latest published snapshot plus an epoch channel to wait on.
#[derive(Clone)]
pub struct OverviewHandle {
    snap: Arc<ArcSwap<ViewSnapshot>>,
    epoch_rx: watch::Receiver<u64>,
}

impl OverviewHandle {
    pub fn current(&self) -> Arc<ViewSnapshot> { self.snap.load_full() }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }
}

/// The overview page's state machine. All mutation happens in
/// [`handle_event`](Self::handle_event), one queued event at a time.
pub struct Overview<V: OverviewView> {
    config: OverviewConfig,
    client: Arc<dyn DaemonClient>,
    view: V,
    containers: Reconciler<ContainerProjection>,
    images: Reconciler<ImageProjection>,
    throttle: Throttle,
    tx: mpsc::UnboundedSender<OverviewEvent>,
    rx: mpsc::UnboundedReceiver<OverviewEvent>,
    storage_seq: u64,
    rendered_seq: u64,
    in_flight: usize,
    usage: UsageDisplay,
    client_closed: bool,
    stream_cancel: Option<CancelHandle>,
    forwarder: Option<JoinHandle<()>>,
    snap: Arc<ArcSwap<ViewSnapshot>>,
    epoch_tx: watch::Sender<u64>,
    epoch_rx: watch::Receiver<u64>,
    epoch: u64,
}

impl<V: OverviewView> Overview<V> {
    pub fn new(config: OverviewConfig, client: Arc<dyn DaemonClient>, view: V) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let notify_tx = tx.clone();
        let throttle = Throttle::new(config.storage_interval, move |ev| {
            let _ = notify_tx.send(OverviewEvent::CooldownElapsed(ev));
        });
        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        Self {
            config,
            client,
            view,
            containers: Reconciler::new("containers", ContainerProjection),
            images: Reconciler::new("images", ImageProjection),
            throttle,
            tx,
            rx,
            storage_seq: 0,
            rendered_seq: 0,
            in_flight: 0,
            usage: UsageDisplay::Unknown,
            client_closed: false,
            stream_cancel: None,
            forwarder: None,
            snap: Arc::new(ArcSwap::from_pointee(ViewSnapshot::default())),
            epoch_tx,
            epoch_rx,
            epoch: 0,
        }
    }

    /// Queue handle for user-driven events (`Refresh`, `Hide`).
    pub fn sender(&self) -> mpsc::UnboundedSender<OverviewEvent> { self.tx.clone() }

    pub fn handle(&self) -> OverviewHandle {
        OverviewHandle { snap: Arc::clone(&self.snap), epoch_rx: self.epoch_rx.clone() }
    }

    pub fn view(&self) -> &V { &self.view }
    pub fn containers(&self) -> &Reconciler<ContainerProjection> { &self.containers }
    pub fn images(&self) -> &Reconciler<ImageProjection> { &self.images }
    pub fn throttle(&self) -> &Throttle { &self.throttle }
    pub fn usage(&self) -> &UsageDisplay { &self.usage }

    /// Subscribe to the client's change stream and forward it into the queue.
    pub async fn attach(&mut self) -> DockviewResult<()> {
        let StreamHandle { mut rx, cancel } = self.client.subscribe().await?;
        let tx = self.tx.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                if tx.send(OverviewEvent::Client(ev)).is_err() {
                    return;
                }
            }
            let _ = tx.send(OverviewEvent::ClientClosed);
        }));
        self.stream_cancel = Some(cancel);
        debug!("overview: attached to client stream");
        Ok(())
    }

    /// Seed both tables from the client's current collections and run the
    /// first storage query outside the throttle.
    pub fn init(&mut self) {
        let t0 = Instant::now();
        let containers = self.client.containers();
        let images = self.client.images();
        let seen_c = self.containers.seed(containers.iter(), self.view.containers());
        let seen_i = self.images.seed(images.iter(), self.view.images());
        info!(
            containers = seen_c,
            images = seen_i,
            image_rows = self.images.len(),
            took_ms = %t0.elapsed().as_millis(),
            "overview: seeded"
        );
        self.refresh_storage();
        self.publish();
    }

    /// Attach, seed, then process the queue until `Hide` (or until drained,
    /// when configured). Returns the view for inspection after teardown.
    pub async fn run(mut self) -> DockviewResult<V> {
        self.attach().await?;
        self.init();
        while let Some(ev) = self.rx.recv().await {
            if self.handle_event(ev) == Flow::Stop {
                break;
            }
        }
        self.teardown();
        Ok(self.view)
    }

    pub fn handle_event(&mut self, ev: OverviewEvent) -> Flow {
        let mut dirty = false;
        match ev {
            OverviewEvent::Client(ev) => {
                dirty |= self.dispatch_client(&ev);
                self.trigger_storage();
            }
            OverviewEvent::ClientClosed => {
                info!(pending = self.throttle.is_pending(), in_flight = self.in_flight, "overview: client stream closed");
                self.client_closed = true;
            }
            OverviewEvent::CooldownElapsed(e) => {
                if self.throttle.on_elapsed(e) {
                    self.refresh_storage();
                }
            }
            OverviewEvent::StorageLoaded { seq, result } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                dirty |= self.render_storage(seq, &result);
            }
            OverviewEvent::Refresh => self.trigger_storage(),
            OverviewEvent::Hide => {
                info!("overview: hide requested");
                return Flow::Stop;
            }
        }
        if dirty {
            self.publish();
        }
        if self.config.exit_when_drained && self.is_drained() {
            debug!("overview: drained");
            return Flow::Stop;
        }
        Flow::Continue
    }

    /// Cancel the cooldown timer and the client stream. Idempotent.
    pub fn teardown(&mut self) {
        self.throttle.cancel();
        if let Some(c) = self.stream_cancel.take() {
            c.cancel();
        }
        if let Some(f) = self.forwarder.take() {
            f.abort();
        }
        info!(
            containers = self.containers.len(),
            images = self.images.len(),
            storage_queries = self.storage_seq,
            "overview: torn down"
        );
    }

    fn is_drained(&self) -> bool {
        self.client_closed && !self.throttle.is_pending() && self.in_flight == 0
    }

    fn dispatch_client(&mut self, ev: &ClientEvent) -> bool {
        let change = match ev {
            ClientEvent::ContainerChanged { id, payload } => {
                self.containers.apply(id, payload.as_ref(), self.view.containers())
            }
            ClientEvent::ImageChanged { id, payload } => self.images.apply(id, payload.as_ref(), self.view.images()),
            ClientEvent::ActivityChanged => return false,
        };
        !matches!(change, Change::Unchanged { .. } | Change::Ignored)
    }

    fn trigger_storage(&mut self) {
        if self.throttle.trigger() {
            self.refresh_storage();
        }
    }

    fn refresh_storage(&mut self) {
        self.storage_seq += 1;
        self.in_flight += 1;
        let seq = self.storage_seq;
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        counter!("storage_refresh_total", 1);
        debug!(seq, "overview: storage query start");
        tokio::spawn(async move {
            let t0 = Instant::now();
            let result = client.query_info().await;
            histogram!("storage_query_ms", t0.elapsed().as_secs_f64() * 1000.0);
            let _ = tx.send(OverviewEvent::StorageLoaded { seq, result });
        });
    }

    fn render_storage(&mut self, seq: u64, result: &DockviewResult<DaemonInfo>) -> bool {
        if seq < self.rendered_seq {
            debug!(seq, rendered = self.rendered_seq, "overview: stale storage result dropped");
            return false;
        }
        self.rendered_seq = seq;
        let usage = storage::render(result);
        self.view.usage().show_usage(&usage);
        debug!(seq, usage = %usage.text(), danger = usage.is_danger(), "overview: storage rendered");
        let changed = usage != self.usage;
        self.usage = usage;
        changed
    }

    fn publish(&mut self) {
        self.epoch += 1;
        let filter = self.config.container_filter;
        let mut filtered_out = 0usize;
        let containers = self
            .containers
            .rows()
            .filter(|r| {
                let keep = filter.admits(r);
                if !keep {
                    filtered_out += 1;
                }
                keep
            })
            .cloned()
            .collect();
        let snap = ViewSnapshot {
            epoch: self.epoch,
            containers,
            filtered_out,
            images: self.images.rows().cloned().collect(),
            usage: self.usage.clone(),
        };
        self.snap.store(Arc::new(snap));
        let _ = self.epoch_tx.send(self.epoch);
        gauge!("overview_container_rows", self.containers.len() as f64);
        gauge!("overview_image_rows", self.images.len() as f64);
    }
}
