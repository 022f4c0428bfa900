//! Entity traits and the sample catalog

pub mod catalog;
pub mod entity;

pub use catalog::{catalog_schemas, MediaItem, MediaKind, MediaTag, Tag, Timeline, TimelineEntry};
pub use entity::{id_value, Entity, EntityId, Ordered, PublicIdentified, ID_FIELD};
