use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use super::unit_of_work::UnitOfWork;
use crate::errors::{Result, TesseraError};
use crate::model::{Entity, EntityId};
use crate::spec::{Cardinality, Filter, Loaded, Relation, SpecResult, Specification};
use crate::storage::{Change, RowQuery};

/// Snapshot read of a table
///
/// Rows are fetched once and deserialized only while iterating. The sequence
/// can be iterated any number of times and never tracks changes.
pub struct FindAll<E> {
    rows: Arc<Vec<Value>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> FindAll<E> {
    fn new(rows: Vec<Value>) -> Self {
        Self {
            rows: Arc::new(rows),
            _entity: PhantomData,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<E>> + '_ {
        self.rows.iter().map(|row| E::from_row(row.clone()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Deserialize every row
    ///
    /// # Errors
    ///
    /// Returns the first `Serialization` error.
    pub fn to_vec(&self) -> Result<Vec<E>> {
        self.iter().collect()
    }
}

impl<E> Clone for FindAll<E> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            _entity: PhantomData,
        }
    }
}

/// Typed access to one table within a unit of work
///
/// Reads go straight to the session; writes are staged in the unit of work.
pub struct Repository<'uow, E> {
    uow: &'uow UnitOfWork,
    _entity: PhantomData<fn() -> E>,
}

impl<'uow, E: Entity> Repository<'uow, E> {
    pub(crate) fn new(uow: &'uow UnitOfWork) -> Self {
        Self {
            uow,
            _entity: PhantomData,
        }
    }

    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn find_all(&self, filter: Option<Filter>) -> Result<FindAll<E>> {
        let rows = self
            .uow
            .session()
            .query(E::TABLE, &RowQuery::filtered(filter))
            .await?;
        Ok(FindAll::new(rows))
    }

    /// First matching row with `include` resolved
    ///
    /// # Errors
    ///
    /// Propagates storage and deserialization errors.
    pub async fn get_first_or_default(
        &self,
        filter: Option<Filter>,
        include: &[Relation],
    ) -> Result<Option<Loaded<E>>> {
        let rows = self
            .uow
            .session()
            .query(E::TABLE, &RowQuery::filtered(filter).limit(1))
            .await?;
        Ok(self.load(rows, include).await?.into_iter().next())
    }

    /// The only matching row with `include` resolved
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousResult` if more than one row matches.
    pub async fn get_single_or_default(
        &self,
        filter: Option<Filter>,
        include: &[Relation],
    ) -> Result<Option<Loaded<E>>> {
        let rows = self
            .uow
            .session()
            .query(E::TABLE, &RowQuery::filtered(filter).limit(2))
            .await?;
        ensure_single::<E>(&rows)?;
        Ok(self.load(rows, include).await?.into_iter().next())
    }

    /// # Errors
    ///
    /// Returns `AmbiguousResult` if the id is stored twice.
    pub async fn get_by_id(&self, id: EntityId) -> Result<Option<E>> {
        Ok(self
            .get_single_or_default(Some(Filter::id_eq(id)), &[])
            .await?
            .map(Loaded::into_entity))
    }

    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn exists(&self, filter: Filter) -> Result<bool> {
        Ok(self.count(Some(filter)).await? > 0)
    }

    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn count(&self, filter: Option<Filter>) -> Result<u64> {
        self.uow.session().count(E::TABLE, filter.as_ref()).await
    }

    /// Stage an insert
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the entity has no JSON object form.
    pub fn create(&self, entity: &E) -> Result<()> {
        self.uow.stage(Change::Insert {
            table: E::TABLE.to_string(),
            id: entity.id(),
            row: entity.to_row()?,
        });
        Ok(())
    }

    /// Stage inserts in submission order
    ///
    /// # Errors
    ///
    /// Returns `Serialization` on the first unserializable entity; nothing
    /// from this call is staged in that case.
    pub fn create_range<'a>(&self, entities: impl IntoIterator<Item = &'a E>) -> Result<()> {
        let changes = entities
            .into_iter()
            .map(|e| {
                Ok(Change::Insert {
                    table: E::TABLE.to_string(),
                    id: e.id(),
                    row: e.to_row()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        changes.into_iter().for_each(|c| self.uow.stage(c));
        Ok(())
    }

    /// Stage a full-row update
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the entity has no JSON object form.
    pub fn update(&self, entity: &E) -> Result<()> {
        self.uow.stage(Change::Update {
            table: E::TABLE.to_string(),
            id: entity.id(),
            row: entity.to_row()?,
        });
        Ok(())
    }

    pub fn delete(&self, entity: &E) {
        self.uow.stage(Change::Delete {
            table: E::TABLE.to_string(),
            id: entity.id(),
        });
    }

    pub fn delete_range<'a>(&self, entities: impl IntoIterator<Item = &'a E>) {
        for entity in entities {
            self.delete(entity);
        }
    }

    /// Execute a prebuilt specification
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousResult` when a single-result specification matches
    /// more than one row.
    pub async fn run_specification(&self, spec: &Specification<E>) -> Result<SpecResult<E>> {
        let rows = self
            .uow
            .session()
            .query(E::TABLE, &spec.to_row_query())
            .await?;

        match spec.cardinality() {
            Cardinality::Single => {
                ensure_single::<E>(&rows)?;
                let loaded = self.load(rows, spec.includes()).await?;
                Ok(SpecResult::Single(loaded.into_iter().next()))
            }
            Cardinality::Many => Ok(SpecResult::Many(self.load(rows, spec.includes()).await?)),
        }
    }

    /// Projected rows for a specification declaring a projection
    ///
    /// Includes are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Validation` without a projection and `AmbiguousResult` for
    /// an ambiguous single-result specification.
    pub async fn run_projection(&self, spec: &Specification<E>) -> Result<Vec<Value>> {
        if spec.projection().is_none() {
            return Err(TesseraError::validation(
                "run_projection",
                format!("specification for {} declares no projection", E::TABLE),
            ));
        }
        let rows = self
            .uow
            .session()
            .query(E::TABLE, &spec.to_row_query())
            .await?;
        if spec.cardinality() == Cardinality::Single {
            ensure_single::<E>(&rows)?;
        }
        rows.iter().map(|row| spec.project_row(row)).collect()
    }

    async fn load(&self, rows: Vec<Value>, include: &[Relation]) -> Result<Vec<Loaded<E>>> {
        let related = if include.is_empty() || rows.is_empty() {
            vec![Default::default(); rows.len()]
        } else {
            self.uow.session().resolve_relations(&rows, include).await?
        };
        rows.into_iter()
            .zip(related)
            .map(|(row, related)| {
                Ok(Loaded {
                    entity: E::from_row(row)?,
                    related,
                })
            })
            .collect()
    }
}

fn ensure_single<E: Entity>(rows: &[Value]) -> Result<()> {
    if rows.len() > 1 {
        return Err(TesseraError::AmbiguousResult {
            table: E::TABLE.to_string(),
            matched: rows.len(),
        });
    }
    Ok(())
}
