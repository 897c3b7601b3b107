//! Row view-models for the two overview tables and their default orderings.

#![forbid(unsafe_code)]

use std::cmp::Ordering;

use chrono::{DateTime, TimeZone, Utc};
use dockview_core::{ContainerInfo, EntityId, ImageInfo};
use serde::Serialize;
use smallvec::SmallVec;

use crate::{Keyed, Projection};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerRow {
    pub id: EntityId,
    pub name: String,
    pub image: String,
    pub command: String,
    pub state: String,
    pub running: bool,
    pub created: Option<DateTime<Utc>>,
}

impl ContainerRow {
    /// Stopped containers are hidden by the "running only" filter.
    pub fn is_unimportant(&self) -> bool { !self.running }
}

impl Keyed for ContainerRow {
    fn id(&self) -> &EntityId { &self.id }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRow {
    pub id: EntityId,
    pub tags: SmallVec<[String; 2]>,
    pub created: Option<DateTime<Utc>>,
    pub virtual_size: u64,
}

impl ImageRow {
    pub fn primary_tag(&self) -> &str { self.tags.first().map(|s| s.as_str()).unwrap_or("") }
}

impl Keyed for ImageRow {
    fn id(&self) -> &EntityId { &self.id }
}

fn to_utc(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

/// Containers sorted by display name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerProjection;

impl Projection for ContainerProjection {
    type Payload = ContainerInfo;
    type Row = ContainerRow;

    fn project(&self, id: &EntityId, c: &ContainerInfo) -> Option<ContainerRow> {
        Some(ContainerRow {
            id: id.clone(),
            name: c.display_name().unwrap_or_else(|| id.short()).to_string(),
            image: c.image.clone().unwrap_or_default(),
            command: c.command.clone().unwrap_or_default(),
            state: c.status_text(),
            running: c.is_running(),
            created: to_utc(c.created),
        })
    }

    fn compare(&self, a: &ContainerRow, b: &ContainerRow) -> Ordering { a.name.cmp(&b.name) }
}

/// Tagged images sorted by primary tag, newest first among equal tags.
/// Dangling images project to `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageProjection;

impl Projection for ImageProjection {
    type Payload = ImageInfo;
    type Row = ImageRow;

    fn project(&self, id: &EntityId, img: &ImageInfo) -> Option<ImageRow> {
        let tags = img.visible_tags()?;
        Some(ImageRow {
            id: id.clone(),
            tags: tags.iter().cloned().collect(),
            created: to_utc(img.created),
            virtual_size: img.virtual_size,
        })
    }

    fn compare(&self, a: &ImageRow, b: &ImageRow) -> Ordering {
        a.primary_tag().cmp(b.primary_tag()).then_with(|| b.created.cmp(&a.created))
    }
}

/// Which containers the view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerFilter {
    #[default]
    All,
    Running,
}

impl ContainerFilter {
    pub fn admits(&self, row: &ContainerRow) -> bool {
        match self {
            ContainerFilter::All => true,
            ContainerFilter::Running => !row.is_unimportant(),
        }
    }
}

impl std::str::FromStr for ContainerFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ContainerFilter::All),
            "running" => Ok(ContainerFilter::Running),
            other => Err(format!("unknown container filter: {} (expect all|running)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(tags: serde_json::Value, created: i64) -> ImageInfo {
        serde_json::from_value(json!({ "RepoTags": tags, "Created": created, "VirtualSize": 1024 })).unwrap()
    }

    #[test]
    fn container_row_falls_back_to_short_id() {
        let id = EntityId::new("4f1c2a9b8e7d6c5b4a39");
        let row = ContainerProjection.project(&id, &ContainerInfo::default()).unwrap();
        assert_eq!(row.name, "4f1c2a9b8e7d");
        assert!(row.is_unimportant());
        assert!(!ContainerFilter::Running.admits(&row));
        assert!(ContainerFilter::All.admits(&row));
    }

    #[test]
    fn image_rows_hide_dangling_tags() {
        let id = EntityId::new("sha256:1");
        assert!(ImageProjection.project(&id, &image(json!(["<none>:<none>"]), 0)).is_none());
        assert!(ImageProjection.project(&id, &image(json!([]), 0)).is_none());
        let row = ImageProjection.project(&id, &image(json!(["nginx:1.25", "nginx:latest"]), 10)).unwrap();
        assert_eq!(row.primary_tag(), "nginx:1.25");
        assert_eq!(row.created.map(|d| d.timestamp()), Some(10));
    }

    #[test]
    fn images_order_by_tag_then_newest() {
        let p = ImageProjection;
        let old = p.project(&"a".into(), &image(json!(["app:v1"]), 100)).unwrap();
        let new = p.project(&"b".into(), &image(json!(["app:v1"]), 200)).unwrap();
        let other = p.project(&"c".into(), &image(json!(["alpine:3"]), 50)).unwrap();
        assert_eq!(p.compare(&new, &old), Ordering::Less);
        assert_eq!(p.compare(&other, &old), Ordering::Less);
    }

    #[test]
    fn filter_parses() {
        assert_eq!("running".parse::<ContainerFilter>(), Ok(ContainerFilter::Running));
        assert!("stopped".parse::<ContainerFilter>().is_err());
    }

    #[test]
    fn rows_serialize_created_as_rfc3339() {
        let id = EntityId::new("sha256:1");
        let row = ImageProjection.project(&id, &image(json!(["nginx:latest"]), 1_577_836_800)).unwrap();
        let v = serde_json::to_value(&row).unwrap();
        assert_eq!(v["created"], json!("2020-01-01T00:00:00Z"));
        assert_eq!(v["id"], json!("sha256:1"));
    }
}
