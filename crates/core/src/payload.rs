//! Daemon payload shapes, decoded from the daemon's JSON with PascalCase keys.
//!
//! Payloads are replaced wholesale on every change; nothing here merges.

#![forbid(unsafe_code)]

use serde::{Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;

use crate::CoreError;

/// Tag the daemon reports for dangling images.
pub const NO_TAG: &str = "<none>:<none>";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerState {
    pub running: bool,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerInfo {
    pub id: Option<String>,
    /// Inspect-style name, usually with a leading `/`.
    pub name: Option<String>,
    /// List-style names; the first entry is used when `name` is absent.
    pub names: SmallVec<[String; 2]>,
    pub image: Option<String>,
    pub command: Option<String>,
    #[serde(deserialize_with = "de_created")]
    pub created: Option<i64>,
    /// Inspect-style structured state.
    pub state: Option<ContainerState>,
    /// List-style human status, e.g. "Up 3 hours".
    pub status: Option<String>,
}

impl ContainerInfo {
    /// Display name without the daemon's leading `/`.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or_else(|| self.names.first().map(|s| s.as_str()))
            .map(|n| n.trim_start_matches('/'))
            .filter(|n| !n.is_empty())
    }

    pub fn is_running(&self) -> bool {
        match &self.state {
            Some(st) => st.running,
            None => self.status.as_deref().map(|s| s.starts_with("Up")).unwrap_or(false),
        }
    }

    pub fn status_text(&self) -> String {
        if let Some(s) = self.state.as_ref().and_then(|st| st.status.clone()) {
            return s;
        }
        if let Some(s) = &self.status {
            return s.clone();
        }
        if self.is_running() { "running".into() } else { "exited".into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageInfo {
    pub id: Option<String>,
    pub repo_tags: Option<SmallVec<[String; 2]>>,
    /// Unix seconds.
    #[serde(deserialize_with = "de_created")]
    pub created: Option<i64>,
    pub virtual_size: u64,
}

impl ImageInfo {
    /// Tags worth showing, or `None` for dangling images.
    pub fn visible_tags(&self) -> Option<&[String]> {
        let tags = self.repo_tags.as_ref()?;
        match tags.first() {
            None => None,
            Some(first) if first == NO_TAG => None,
            Some(_) => Some(tags.as_slice()),
        }
    }
}

/// Result of the daemon's info query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DaemonInfo {
    pub driver: String,
    /// `[label, value]` pairs; kept loose because drivers disagree on shape.
    pub driver_status: Vec<serde_json::Value>,
}

impl DaemonInfo {
    pub fn from_json(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Well-formed `(label, value)` pairs; anything else is skipped.
    pub fn status_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.driver_status.iter().filter_map(|v| {
            let arr = v.as_array()?;
            let label = arr.first()?.as_str()?;
            let value = arr.get(1)?.as_str()?;
            Some((label, value))
        })
    }

    pub fn status_value(&self, label: &str) -> Option<&str> {
        self.status_pairs().find(|(l, _)| *l == label).map(|(_, v)| v)
    }
}

// The list endpoint reports `Created` as unix seconds, inspect as RFC3339.
fn de_created<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => chrono::DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.timestamp()),
        _ => None,
    })
}
