use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{Result, TesseraError};
use crate::storage::TableSchema;

/// Identifier of a stored row
pub type EntityId = Uuid;

/// Name of the identifier field every row carries
pub const ID_FIELD: &str = "id";

/// A stored record type
///
/// Rows are the serde JSON form of the entity. The JSON object must carry the
/// entity id under [`ID_FIELD`].
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table (collection) name in storage
    const TABLE: &'static str;

    fn id(&self) -> EntityId;

    /// Fields whose non-null values must be unique across live rows
    fn unique_fields() -> &'static [&'static str] {
        &[]
    }

    /// Storage declaration for this entity's table
    fn schema() -> TableSchema {
        TableSchema::new(Self::TABLE).with_unique_fields(Self::unique_fields())
    }

    /// # Errors
    ///
    /// Returns `Serialization` if the entity does not serialize to a JSON object.
    fn to_row(&self) -> Result<Value> {
        let row = serde_json::to_value(self)?;
        if !row.is_object() {
            return Err(TesseraError::Serialization {
                message: format!("{} row is not a JSON object", Self::TABLE),
            });
        }
        Ok(row)
    }

    /// # Errors
    ///
    /// Returns `Serialization` if the row does not match the entity shape.
    fn from_row(row: Value) -> Result<Self> {
        serde_json::from_value(row).map_err(|e| TesseraError::Serialization {
            message: format!("{} row: {}", Self::TABLE, e),
        })
    }
}

/// A child record with a dense 1-based position under its parent
///
/// Between operations the live children of one parent hold exactly the
/// positions `{1..N}`.
pub trait Ordered: Entity {
    /// Field holding the parent id
    const PARENT_FIELD: &'static str;

    /// Field holding the position
    const POSITION_FIELD: &'static str = "position";

    fn parent_id(&self) -> EntityId;

    fn position(&self) -> u32;

    fn set_position(&mut self, position: u32);
}

/// A record carrying a randomly minted, non-sequential public identifier
pub trait PublicIdentified: Entity {
    const PUBLIC_ID_FIELD: &'static str = "public_id";

    fn public_id(&self) -> u64;
}

/// JSON value of an entity id as stored in rows
pub fn id_value(id: EntityId) -> Value {
    Value::String(id.to_string())
}
