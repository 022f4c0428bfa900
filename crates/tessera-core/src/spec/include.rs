//! Eager-load relation trees and the rows they resolve to

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Deref;

use super::filter::OrderBy;
use crate::errors::Result;
use crate::model::Entity;

/// How a relation joins the source row to target rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// Source row holds the target id in `foreign_key`
    BelongsTo { foreign_key: String },
    /// Target rows hold the source id in `foreign_key`
    HasMany { foreign_key: String },
}

/// One node of an eager-load tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Key under which resolved rows are returned
    pub name: String,
    pub kind: RelationKind,
    pub target_table: String,
    pub nested: Vec<Relation>,
    pub order_by: Vec<OrderBy>,
}

impl Relation {
    pub fn belongs_to(
        name: impl Into<String>,
        target_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationKind::BelongsTo {
                foreign_key: foreign_key.into(),
            },
            target_table: target_table.into(),
            nested: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn has_many(
        name: impl Into<String>,
        target_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationKind::HasMany {
                foreign_key: foreign_key.into(),
            },
            target_table: target_table.into(),
            nested: Vec::new(),
            order_by: Vec::new(),
        }
    }

    /// Typed shorthand: `name` belongs to a `T` through `foreign_key`
    pub fn to_one<T: Entity>(name: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::belongs_to(name, T::TABLE, foreign_key)
    }

    /// Typed shorthand: `name` is every `T` whose `foreign_key` holds the source id
    pub fn to_many<T: Entity>(name: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::has_many(name, T::TABLE, foreign_key)
    }

    /// Eager-load `relation` from each target row as well
    pub fn then_include(mut self, relation: Relation) -> Self {
        self.nested.push(relation);
        self
    }

    pub fn ordered_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Depth of the tree rooted here (a leaf is 1)
    pub fn depth(&self) -> usize {
        1 + self.nested.iter().map(Relation::depth).max().unwrap_or(0)
    }
}

/// Related rows for one source row, keyed by relation name
pub type RelatedMap = BTreeMap<String, Vec<LoadedRow>>;

/// A raw row together with whatever was eager-loaded from it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadedRow {
    pub row: Value,
    pub related: RelatedMap,
}

impl LoadedRow {
    pub fn new(row: Value) -> Self {
        Self {
            row,
            related: RelatedMap::new(),
        }
    }

    pub fn related(&self, name: &str) -> &[LoadedRow] {
        self.related.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// # Errors
    ///
    /// Returns `Serialization` if the row is not a `T`.
    pub fn decode<T: Entity>(&self) -> Result<T> {
        T::from_row(self.row.clone())
    }
}

/// An entity plus its eager-loaded relations
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<E> {
    pub entity: E,
    pub related: RelatedMap,
}

impl<E: Entity> Loaded<E> {
    pub fn new(entity: E) -> Self {
        Self {
            entity,
            related: RelatedMap::new(),
        }
    }

    pub fn into_entity(self) -> E {
        self.entity
    }

    /// Rows loaded under `name`; empty when the relation was not requested
    pub fn related(&self, name: &str) -> &[LoadedRow] {
        self.related.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decode the rows loaded under `name` as `T`
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if any row is not a `T`.
    pub fn related_as<T: Entity>(&self, name: &str) -> Result<Vec<T>> {
        self.related(name).iter().map(LoadedRow::decode).collect()
    }

    /// Decode the single row of a belongs-to relation
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the row is not a `T`.
    pub fn related_one<T: Entity>(&self, name: &str) -> Result<Option<T>> {
        self.related(name).first().map(LoadedRow::decode).transpose()
    }
}

impl<E> Deref for Loaded<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.entity
    }
}
