#![forbid(unsafe_code)]

use dockview_api::DockviewResult;
use dockview_core::{ClientEvent, DaemonInfo};
use dockview_store::{ContainerRow, ImageRow, RowSink, RowTable};
use serde::Serialize;

use crate::storage::{UsageDisplay, UsageSink};
use crate::throttle::CooldownElapsed;

/// Everything the overview loop reacts to, delivered one at a time.
#[derive(Debug)]
pub enum OverviewEvent {
    Client(ClientEvent),
    /// The client's event stream ended.
    ClientClosed,
    CooldownElapsed(CooldownElapsed),
    StorageLoaded { seq: u64, result: DockviewResult<DaemonInfo> },
    /// User asked for a storage refresh; goes through the throttle.
    Refresh,
    /// View hidden or destroyed.
    Hide,
}

/// Presentation surface the overview writes into.
pub trait OverviewView {
    fn containers(&mut self) -> &mut dyn RowSink<ContainerRow>;
    fn images(&mut self) -> &mut dyn RowSink<ImageRow>;
    fn usage(&mut self) -> &mut dyn UsageSink;
}

/// Published read-side state after each processed event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewSnapshot {
    pub epoch: u64,
    /// Containers admitted by the active filter, in sort order.
    pub containers: Vec<ContainerRow>,
    /// Containers hidden by the filter.
    pub filtered_out: usize,
    pub images: Vec<ImageRow>,
    pub usage: UsageDisplay,
}

/// Table mirrors plus the last usage shown; the view used by the CLI and tests.
#[derive(Debug, Default)]
pub struct HeadlessView {
    pub containers: RowTable<ContainerRow>,
    pub images: RowTable<ImageRow>,
    pub usage: UsageDisplay,
    pub usage_renders: u64,
}

impl UsageSink for HeadlessView {
    fn show_usage(&mut self, usage: &UsageDisplay) {
        self.usage = usage.clone();
        self.usage_renders += 1;
    }
}

impl OverviewView for HeadlessView {
    fn containers(&mut self) -> &mut dyn RowSink<ContainerRow> { &mut self.containers }
    fn images(&mut self) -> &mut dyn RowSink<ImageRow> { &mut self.images }
    fn usage(&mut self) -> &mut dyn UsageSink { self }
}
