//! Dockview overview: the event loop behind the container dashboard.
//!
//! Client change events are reconciled into container and image tables; any
//! daemon activity also drives a trailing throttle that refreshes storage
//! pool usage at most once per interval.

#![forbid(unsafe_code)]

pub mod config;
pub mod model;
pub mod overview;
pub mod size;
pub mod storage;
pub mod throttle;

pub use config::OverviewConfig;
pub use model::{HeadlessView, OverviewEvent, OverviewView, ViewSnapshot};
pub use overview::{Flow, Overview, OverviewHandle};
pub use storage::{UsageDisplay, UsageSink};
pub use throttle::{CooldownElapsed, Throttle};
