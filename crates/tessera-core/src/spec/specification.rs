use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;

use super::filter::{field_value, Filter, OrderBy};
use super::include::{Loaded, Relation};
use crate::errors::{Result, TesseraError};
use crate::model::Entity;
use crate::storage::RowQuery;

/// Expected number of results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Zero or one row; more than one is `AmbiguousResult`
    Single,
    Many,
}

/// Reusable, immutable query description for one entity type
///
/// Built by value and shared by cloning. Running it never mutates it.
pub struct Specification<E> {
    filter: Option<Filter>,
    includes: Vec<Relation>,
    order_by: Vec<OrderBy>,
    projection: Option<Vec<String>>,
    cardinality: Cardinality,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Specification<E> {
    fn with_cardinality(cardinality: Cardinality) -> Self {
        Self {
            filter: None,
            includes: Vec::new(),
            order_by: Vec::new(),
            projection: None,
            cardinality,
            _entity: PhantomData,
        }
    }

    pub fn many() -> Self {
        Self::with_cardinality(Cardinality::Many)
    }

    pub fn single() -> Self {
        Self::with_cardinality(Cardinality::Single)
    }

    /// Add a predicate; repeated calls are ANDed
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn include(mut self, relation: Relation) -> Self {
        self.includes.push(relation);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Restrict projected rows to these fields
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Combine with another specification of the same entity
    ///
    /// Filters are ANDed, includes and ordering are appended. Cardinality is
    /// `Single` if either side expects a single result.
    pub fn and(mut self, other: Specification<E>) -> Self {
        if let Some(filter) = other.filter {
            self = self.filter(filter);
        }
        self.includes.extend(other.includes);
        self.order_by.extend(other.order_by);
        if self.projection.is_none() {
            self.projection = other.projection;
        }
        if other.cardinality == Cardinality::Single {
            self.cardinality = Cardinality::Single;
        }
        self
    }

    pub fn filter_ref(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn includes(&self) -> &[Relation] {
        &self.includes
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Storage query for this specification
    ///
    /// A single-result query fetches at most two rows, enough to detect
    /// ambiguity.
    pub fn to_row_query(&self) -> RowQuery {
        RowQuery {
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            limit: match self.cardinality {
                Cardinality::Single => Some(2),
                Cardinality::Many => None,
            },
        }
    }

    /// Apply the projection to one raw row
    ///
    /// # Errors
    ///
    /// Returns `Validation` if no projection is declared.
    pub fn project_row(&self, row: &Value) -> Result<Value> {
        let fields = self.projection.as_ref().ok_or_else(|| {
            TesseraError::validation(
                "run_projection",
                format!("specification for {} declares no projection", E::TABLE),
            )
        })?;
        let mut out = Map::new();
        for field in fields {
            out.insert(field.clone(), field_value(row, field).clone());
        }
        Ok(Value::Object(out))
    }
}

impl<E> Clone for Specification<E> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            includes: self.includes.clone(),
            order_by: self.order_by.clone(),
            projection: self.projection.clone(),
            cardinality: self.cardinality,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Specification<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("table", &E::TABLE)
            .field("filter", &self.filter)
            .field("includes", &self.includes)
            .field("order_by", &self.order_by)
            .field("projection", &self.projection)
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

/// Outcome of running a specification
#[derive(Debug, Clone, PartialEq)]
pub enum SpecResult<E> {
    Single(Option<Loaded<E>>),
    Many(Vec<Loaded<E>>),
}

impl<E> SpecResult<E> {
    /// Flatten into a vector regardless of cardinality
    pub fn into_vec(self) -> Vec<Loaded<E>> {
        match self {
            SpecResult::Single(one) => one.into_iter().collect(),
            SpecResult::Many(many) => many,
        }
    }

    pub fn into_single(self) -> Option<Loaded<E>> {
        match self {
            SpecResult::Single(one) => one,
            SpecResult::Many(many) => many.into_iter().next(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SpecResult::Single(one) => usize::from(one.is_some()),
            SpecResult::Many(many) => many.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
