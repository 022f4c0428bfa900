use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{Entity, EntityId, Ordered, PublicIdentified};

/// An ordered collection of media items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub id: EntityId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Timeline {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: title.into(),
            created_at: Utc::now(),
        }
    }
}

impl Entity for Timeline {
    const TABLE: &'static str = "timelines";

    fn id(&self) -> EntityId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

/// A media record addressable by its public id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: EntityId,

    /// Randomly minted, unique among live media items
    pub public_id: u64,

    pub title: String,
    pub kind: MediaKind,
    pub created_at: DateTime<Utc>,
}

impl MediaItem {
    pub fn new(public_id: u64, title: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            public_id,
            title: title.into(),
            kind,
            created_at: Utc::now(),
        }
    }
}

impl Entity for MediaItem {
    const TABLE: &'static str = "media_items";

    fn id(&self) -> EntityId {
        self.id
    }

    fn unique_fields() -> &'static [&'static str] {
        &["public_id"]
    }
}

impl PublicIdentified for MediaItem {
    fn public_id(&self) -> u64 {
        self.public_id
    }
}

/// Link placing a media item at a position on a timeline
///
/// Created in the same transaction as the media item it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: EntityId,
    pub timeline_id: EntityId,
    pub media_id: EntityId,

    /// 1-based slot under `timeline_id`
    pub position: u32,
}

impl TimelineEntry {
    pub fn new(timeline_id: EntityId, media_id: EntityId, position: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            timeline_id,
            media_id,
            position,
        }
    }
}

impl Entity for TimelineEntry {
    const TABLE: &'static str = "timeline_entries";

    fn id(&self) -> EntityId {
        self.id
    }
}

impl Ordered for TimelineEntry {
    const PARENT_FIELD: &'static str = "timeline_id";

    fn parent_id(&self) -> EntityId {
        self.timeline_id
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: EntityId,
    pub public_id: u64,
    pub name: String,
}

impl Tag {
    pub fn new(public_id: u64, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            public_id,
            name: name.into(),
        }
    }
}

impl Entity for Tag {
    const TABLE: &'static str = "tags";

    fn id(&self) -> EntityId {
        self.id
    }

    fn unique_fields() -> &'static [&'static str] {
        &["name", "public_id"]
    }
}

impl PublicIdentified for Tag {
    fn public_id(&self) -> u64 {
        self.public_id
    }
}

/// Link between a media item and a tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTag {
    pub id: EntityId,
    pub media_id: EntityId,
    pub tag_id: EntityId,
}

impl MediaTag {
    pub fn new(media_id: EntityId, tag_id: EntityId) -> Self {
        Self {
            id: Uuid::now_v7(),
            media_id,
            tag_id,
        }
    }
}

impl Entity for MediaTag {
    const TABLE: &'static str = "media_tags";

    fn id(&self) -> EntityId {
        self.id
    }
}

/// Table declarations for every catalog entity
pub fn catalog_schemas() -> Vec<crate::storage::TableSchema> {
    vec![
        Timeline::schema(),
        MediaItem::schema(),
        TimelineEntry::schema(),
        Tag::schema(),
        MediaTag::schema(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::ID_FIELD;

    #[test]
    fn test_row_carries_id_field() {
        let timeline = Timeline::new("Holiday");
        let row = timeline.to_row().unwrap();
        assert_eq!(row[ID_FIELD], serde_json::json!(timeline.id.to_string()));
    }

    #[test]
    fn test_entry_row_round_trip_keeps_position() {
        let entry = TimelineEntry::new(Uuid::now_v7(), Uuid::now_v7(), 3);
        let back = TimelineEntry::from_row(entry.to_row().unwrap()).unwrap();
        assert_eq!(back.position(), 3);
        assert_eq!(back.parent_id(), entry.timeline_id);
    }

    #[test]
    fn test_tag_schema_declares_unique_name() {
        let schema = Tag::schema();
        assert_eq!(schema.table, "tags");
        assert!(schema.unique_fields.iter().any(|f| f == "name"));
    }

    #[test]
    fn test_from_row_rejects_wrong_shape() {
        let err = Timeline::from_row(serde_json::json!({"id": 5})).unwrap_err();
        assert!(matches!(err, crate::errors::TesseraError::Serialization { .. }));
    }
}
