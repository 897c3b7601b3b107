//! Storage pool usage: daemon info blob -> usage bar state.
//!
//! Only the devicemapper driver reports pool sizing. Anything else, a
//! failed query, or missing/unparseable fields renders as `Unknown`.

#![forbid(unsafe_code)]

use dockview_api::DockviewResult;
use dockview_core::DaemonInfo;
use serde::Serialize;
use tracing::{debug, warn};

use crate::size::{format_size, parse_size};

pub const SIZED_DRIVER: &str = "devicemapper";
pub const KEY_USED: &str = "Data Space Used";
pub const KEY_TOTAL: &str = "Data Space Total";
pub const KEY_AVAILABLE: &str = "Data Space Available";

/// Used fraction above which the bar is drawn in the danger state.
pub const DANGER_RATIO: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum UsageDisplay {
    #[default]
    Unknown,
    Known {
        used: u64,
        total: u64,
        /// "used / total" as shown next to the bar.
        text: String,
        danger: bool,
        /// No available-space figure: total may be the sparse pool size
        /// rather than what the backing device can hold.
        sparse_warning: bool,
    },
}

impl UsageDisplay {
    pub fn fraction(&self) -> Option<f64> {
        match self {
            UsageDisplay::Known { used, total, .. } if *total > 0 => Some(*used as f64 / *total as f64),
            _ => None,
        }
    }

    pub fn is_danger(&self) -> bool { matches!(self, UsageDisplay::Known { danger: true, .. }) }

    pub fn text(&self) -> &str {
        match self {
            UsageDisplay::Known { text, .. } => text,
            UsageDisplay::Unknown => "Unknown",
        }
    }
}

/// Outward bar-widget interface.
pub trait UsageSink {
    fn show_usage(&mut self, usage: &UsageDisplay);
}

/// Render a query result; errors are swallowed into `Unknown`.
pub fn render(result: &DockviewResult<DaemonInfo>) -> UsageDisplay {
    match result {
        Ok(info) => usage_from_info(info),
        Err(e) => {
            debug!(error = %e, "storage: info query failed");
            UsageDisplay::Unknown
        }
    }
}

pub fn usage_from_info(info: &DaemonInfo) -> UsageDisplay {
    if info.driver != SIZED_DRIVER {
        debug!(driver = %info.driver, "storage: driver reports no sizing");
        return UsageDisplay::Unknown;
    }
    let (Some(used_text), Some(total_text)) = (info.status_value(KEY_USED), info.status_value(KEY_TOTAL)) else {
        return UsageDisplay::Unknown;
    };
    let used = match parse_size(used_text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "storage: bad used size");
            return UsageDisplay::Unknown;
        }
    };
    // Prefer available when present: accurate for sparse-file backed pools.
    let (total, total_text, sparse_warning) = match info.status_value(KEY_AVAILABLE).map(parse_size) {
        Some(Ok(avail)) => {
            let total = used.saturating_add(avail);
            (total, format_size(total), false)
        }
        Some(Err(e)) => {
            warn!(error = %e, "storage: bad available size");
            return UsageDisplay::Unknown;
        }
        None => match parse_size(total_text) {
            Ok(total) => (total, total_text.trim().to_string(), true),
            Err(e) => {
                warn!(error = %e, "storage: bad total size");
                return UsageDisplay::Unknown;
            }
        },
    };
    if total == 0 {
        return UsageDisplay::Unknown;
    }
    UsageDisplay::Known {
        used,
        total,
        text: format!("{} / {}", used_text.trim(), total_text),
        danger: used as f64 > DANGER_RATIO * total as f64,
        sparse_warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockview_api::DockviewError;

    fn info(driver: &str, pairs: &[(&str, &str)]) -> DaemonInfo {
        DaemonInfo {
            driver: driver.to_string(),
            driver_status: pairs.iter().map(|(k, v)| serde_json::json!([k, v])).collect(),
        }
    }

    #[test]
    fn devicemapper_used_and_total() {
        let u = usage_from_info(&info("devicemapper", &[(KEY_USED, "8 GB"), (KEY_TOTAL, "10 GB")]));
        assert_eq!(
            u,
            UsageDisplay::Known {
                used: 8_000_000_000,
                total: 10_000_000_000,
                text: "8 GB / 10 GB".into(),
                danger: false,
                sparse_warning: true,
            }
        );
        assert_eq!(u.fraction(), Some(0.8));
    }

    #[test]
    fn available_overrides_total() {
        let u = usage_from_info(&info(
            "devicemapper",
            &[(KEY_USED, "2 GB"), (KEY_TOTAL, "100 GB"), (KEY_AVAILABLE, "3 GB")],
        ));
        match u {
            UsageDisplay::Known { total, text, sparse_warning, .. } => {
                assert_eq!(total, 5_000_000_000);
                assert_eq!(text, "2 GB / 5 GB");
                assert!(!sparse_warning);
            }
            other => panic!("expected known usage, got {:?}", other),
        }
    }

    #[test]
    fn danger_above_ninety_five_percent() {
        let u = usage_from_info(&info("devicemapper", &[(KEY_USED, "9.6 GB"), (KEY_TOTAL, "10 GB")]));
        assert!(u.is_danger());
        let edge = usage_from_info(&info("devicemapper", &[(KEY_USED, "9.5 GB"), (KEY_TOTAL, "10 GB")]));
        assert!(!edge.is_danger());
    }

    #[test]
    fn other_drivers_and_failures_are_unknown() {
        assert_eq!(usage_from_info(&info("overlay2", &[(KEY_USED, "8 GB"), (KEY_TOTAL, "10 GB")])), UsageDisplay::Unknown);
        assert_eq!(usage_from_info(&info("devicemapper", &[(KEY_USED, "8 GB")])), UsageDisplay::Unknown);
        assert_eq!(usage_from_info(&info("devicemapper", &[(KEY_USED, "eight"), (KEY_TOTAL, "10 GB")])), UsageDisplay::Unknown);
        assert_eq!(render(&Err(DockviewError::Internal("socket closed".into()))), UsageDisplay::Unknown);
        assert_eq!(UsageDisplay::Unknown.text(), "Unknown");
    }
}
