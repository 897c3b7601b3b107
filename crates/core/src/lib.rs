//! Dockview core types: entity ids, daemon payloads and change events.

#![forbid(unsafe_code)]

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod payload;

pub use payload::{ContainerInfo, ContainerState, DaemonInfo, ImageInfo, NO_TAG};

/// Opaque daemon-assigned key, stable for an entity's lifetime and unique
/// within its collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    pub fn as_str(&self) -> &str { &self.0 }

    /// First 12 characters, the way daemon tooling abbreviates ids.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((i, _)) => &self.0[..i],
            None => &self.0,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str { &self.0 }
}

impl From<&str> for EntityId {
    fn from(v: &str) -> Self { Self(v.to_string()) }
}

impl From<String> for EntityId {
    fn from(v: String) -> Self { Self(v) }
}

/// Change notification emitted by the daemon client.
///
/// A `None` payload signals removal of the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    ContainerChanged { id: EntityId, payload: Option<ContainerInfo> },
    ImageChanged { id: EntityId, payload: Option<ImageInfo> },
    /// Any daemon activity that may have changed storage usage.
    ActivityChanged,
}

impl ClientEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::ContainerChanged { .. } => "container-changed",
            ClientEvent::ImageChanged { .. } => "image-changed",
            ClientEvent::ActivityChanged => "activity-changed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_truncates_long_ids_only() {
        let long = EntityId::new("0123456789abcdef0123");
        assert_eq!(long.short(), "0123456789ab");
        let short = EntityId::new("c1");
        assert_eq!(short.short(), "c1");
    }

    #[test]
    fn events_decode_from_tagged_json() {
        let ev: ClientEvent = serde_json::from_value(serde_json::json!({
            "event": "container-changed",
            "id": "c1",
            "payload": { "Name": "/web" }
        }))
        .unwrap();
        match ev {
            ClientEvent::ContainerChanged { id, payload } => {
                assert_eq!(id.as_str(), "c1");
                assert_eq!(payload.unwrap().name.as_deref(), Some("/web"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let removed: ClientEvent = serde_json::from_value(serde_json::json!({
            "event": "image-changed",
            "id": "sha256:aa",
            "payload": null
        }))
        .unwrap();
        assert_eq!(removed, ClientEvent::ImageChanged { id: "sha256:aa".into(), payload: None });

        let activity: ClientEvent = serde_json::from_value(serde_json::json!({ "event": "activity-changed" })).unwrap();
        assert_eq!(activity.kind(), "activity-changed");
    }
}
