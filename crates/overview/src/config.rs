#![forbid(unsafe_code)]

use std::time::Duration;

use dockview_store::ContainerFilter;

use crate::throttle::DEFAULT_INTERVAL;

#[derive(Debug, Clone)]
pub struct OverviewConfig {
    /// Minimum spacing between storage usage queries.
    pub storage_interval: Duration,
    /// Buffer for the client's event stream.
    pub queue_cap: usize,
    pub container_filter: ContainerFilter,
    /// Stop `run` once the client stream has ended and no storage refresh
    /// is pending or in flight. Interactive views leave this off and stop on `Hide`.
    pub exit_when_drained: bool,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            storage_interval: DEFAULT_INTERVAL,
            queue_cap: 2048,
            container_filter: ContainerFilter::All,
            exit_when_drained: false,
        }
    }
}

impl OverviewConfig {
    /// Defaults overridden by `DOCKVIEW_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        let storage_interval = std::env::var("DOCKVIEW_STORAGE_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(d.storage_interval);
        let queue_cap = std::env::var("DOCKVIEW_QUEUE_CAP").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(d.queue_cap);
        let container_filter = std::env::var("DOCKVIEW_CONTAINER_FILTER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(d.container_filter);
        Self { storage_interval, queue_cap, container_filter, ..d }
    }
}
