//! Storage port
//!
//! Repositories and the unit of work talk to storage only through [`Session`].
//! A session is owned by one request; engines hand out a fresh session per
//! request.

pub mod memory;
pub mod relations;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::model::EntityId;
use crate::spec::{Filter, OrderBy, RelatedMap, Relation};

pub use memory::{Fault, MemoryEngine, MemorySession};

/// Declaration of one table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSchema {
    pub table: String,
    pub unique_fields: Vec<String>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            unique_fields: Vec::new(),
        }
    }

    pub fn with_unique_fields(mut self, fields: &[&str]) -> Self {
        self.unique_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

/// Read request against one table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowQuery {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered(filter: Option<Filter>) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn ordered_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One staged write
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Insert {
        table: String,
        id: EntityId,
        row: Value,
    },
    Update {
        table: String,
        id: EntityId,
        row: Value,
    },
    Delete {
        table: String,
        id: EntityId,
    },
}

impl Change {
    pub fn table(&self) -> &str {
        match self {
            Change::Insert { table, .. }
            | Change::Update { table, .. }
            | Change::Delete { table, .. } => table,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            Change::Insert { id, .. } | Change::Update { id, .. } | Change::Delete { id, .. } => {
                *id
            }
        }
    }
}

/// Ordered set of writes applied atomically
///
/// Affected rows: an insert counts 1; an update or delete counts 1 when the
/// row existed and 0 otherwise. A uniqueness violation fails the whole batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeBatch {
    pub changes: Vec<Change>,
}

impl ChangeBatch {
    pub fn new(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Distinct tables touched, in first-touch order
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for change in &self.changes {
            if !tables.contains(&change.table()) {
                tables.push(change.table());
            }
        }
        tables
    }
}

/// Request-scoped connection to a storage engine
///
/// While a transaction is open every read sees the transaction's own
/// writes, and every batch joins it.
#[async_trait]
pub trait Session: Send + Sync {
    /// Short engine name used in logs and `Storage` errors
    fn engine(&self) -> &'static str;

    /// Create the table and its unique constraints if missing
    async fn ensure_table(&self, schema: &TableSchema) -> Result<()>;

    async fn query(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>>;

    async fn count(&self, table: &str, filter: Option<&Filter>) -> Result<u64>;

    /// Apply a batch atomically and return the affected-row count
    async fn execute_batch(&self, batch: ChangeBatch) -> Result<i64>;

    async fn begin(&self) -> Result<()>;

    async fn commit_transaction(&self) -> Result<()>;

    /// Discard the open transaction
    ///
    /// Synchronous so it can run from `Drop`, which may be on an async worker.
    /// Must not block behind an in-flight statement, and must also cover a
    /// `begin` that was cancelled before it finished: storage may not apply
    /// that `begin` until after this returns.
    fn rollback(&self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    /// Resolve an eager-load tree for `rows`, one map per input row
    async fn resolve_relations(
        &self,
        rows: &[Value],
        relations: &[Relation],
    ) -> Result<Vec<RelatedMap>> {
        relations::resolve_by_query(self, rows, relations).await
    }
}
