//! In-memory storage engine
//!
//! Tables of JSON rows behind an `RwLock`, shared by every session of one
//! engine. A transaction works on a private copy of the tables and records
//! each batch it executes. Completing the transaction replays that log onto a
//! clone of the shared tables and swaps the clone in, so either every batch
//! lands or none does.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::{Change, ChangeBatch, RowQuery, Session, TableSchema};
use crate::errors::{Result, TesseraError};
use crate::model::{EntityId, ID_FIELD};
use crate::spec::filter::{compare_rows, field_value, values_equal};
use crate::spec::Filter;

const ENGINE: &str = "memory";

/// Injected misbehaviour for failure-path tests
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Batches touching `table` write nothing and report zero affected rows
    ZeroRows { table: String },
    /// Batches touching `table` fail with a storage error
    Error { table: String, message: String },
}

impl Fault {
    fn table(&self) -> &str {
        match self {
            Fault::ZeroRows { table } | Fault::Error { table, .. } => table,
        }
    }
}

#[derive(Debug, Clone)]
struct MemTable {
    schema: TableSchema,
    /// Insertion sequence -> row
    rows: BTreeMap<u64, Value>,
    index: HashMap<EntityId, u64>,
    next_seq: u64,
}

impl MemTable {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    fn apply(&mut self, change: &Change) -> Result<i64> {
        match change {
            Change::Insert { id, row, .. } => {
                if self.index.contains_key(id) {
                    return Err(self.conflict(ID_FIELD, &Value::String(id.to_string())));
                }
                self.check_unique(row, None)?;
                let seq = self.next_seq;
                self.next_seq += 1;
                self.rows.insert(seq, row.clone());
                self.index.insert(*id, seq);
                Ok(1)
            }
            Change::Update { id, row, .. } => match self.index.get(id).copied() {
                Some(seq) => {
                    self.check_unique(row, Some(seq))?;
                    self.rows.insert(seq, row.clone());
                    Ok(1)
                }
                None => Ok(0),
            },
            Change::Delete { id, .. } => match self.index.remove(id) {
                Some(seq) => {
                    self.rows.remove(&seq);
                    Ok(1)
                }
                None => Ok(0),
            },
        }
    }

    fn check_unique(&self, row: &Value, skip: Option<u64>) -> Result<()> {
        for field in &self.schema.unique_fields {
            let value = field_value(row, field);
            if value.is_null() {
                continue;
            }
            let taken = self
                .rows
                .iter()
                .any(|(seq, other)| Some(*seq) != skip && values_equal(field_value(other, field), value));
            if taken {
                return Err(self.conflict(field, value));
            }
        }
        Ok(())
    }

    fn conflict(&self, field: &str, value: &Value) -> TesseraError {
        TesseraError::UniquenessConflict {
            table: self.schema.table.clone(),
            field: field.to_string(),
            detail: format!("value {} is already taken", value),
        }
    }

    fn select(&self, query: &RowQuery) -> Vec<Value> {
        let mut rows: Vec<Value> = self
            .rows
            .values()
            .filter(|row| query.filter.as_ref().map_or(true, |f| f.matches(row)))
            .cloned()
            .collect();
        if !query.order_by.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &query.order_by));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows
    }
}

type Tables = HashMap<String, MemTable>;

/// Apply one batch to `tables`, all or nothing
fn apply_batch(tables: &mut Tables, batch: &ChangeBatch) -> Result<i64> {
    let mut staged: Tables = batch
        .tables()
        .into_iter()
        .map(|name| {
            let table = tables
                .get(name)
                .cloned()
                .unwrap_or_else(|| MemTable::new(TableSchema::new(name)));
            (name.to_string(), table)
        })
        .collect();

    let mut affected = 0;
    for change in &batch.changes {
        let table = staged
            .get_mut(change.table())
            .ok_or_else(|| TesseraError::Internal {
                message: format!("batch table {} was not staged", change.table()),
            })?;
        affected += table.apply(change)?;
    }

    tables.extend(staged);
    Ok(affected)
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    faults: Mutex<Vec<Fault>>,
}

/// Process-local storage engine
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request-scoped session
    pub fn session(&self) -> MemorySession {
        MemorySession {
            shared: self.shared.clone(),
            tx: Mutex::new(None),
        }
    }

    /// Make every later batch touching the fault's table misbehave
    pub fn inject(&self, fault: Fault) {
        lock(&self.shared.faults).push(fault);
    }

    pub fn clear_faults(&self) {
        lock(&self.shared.faults).clear();
    }

    /// Committed rows of `table` in insertion order
    pub fn committed_rows(&self, table: &str) -> Vec<Value> {
        let tables = self
            .shared
            .tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tables
            .get(table)
            .map(|t| t.select(&RowQuery::all()))
            .unwrap_or_default()
    }
}

struct Overlay {
    working: Tables,
    log: Vec<ChangeBatch>,
}

/// Session over a [`MemoryEngine`]
pub struct MemorySession {
    shared: Arc<Shared>,
    tx: Mutex<Option<Overlay>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn poisoned() -> TesseraError {
    TesseraError::Storage {
        engine: ENGINE.to_string(),
        message: "table lock poisoned".to_string(),
    }
}

fn no_transaction(op: &str) -> TesseraError {
    TesseraError::TransactionState {
        tx_id: "none".to_string(),
        op: op.to_string(),
        reason: "session has no open transaction".to_string(),
    }
}

impl MemorySession {
    fn check_faults(&self, batch: &ChangeBatch) -> Result<Option<i64>> {
        let faults = lock(&self.shared.faults);
        let touched = batch.tables();
        for fault in faults.iter().filter(|f| touched.contains(&f.table())) {
            match fault {
                Fault::ZeroRows { table } => {
                    tracing::debug!(engine = ENGINE, table = %table, "fault: zero rows");
                    return Ok(Some(0));
                }
                Fault::Error { table, message } => {
                    return Err(TesseraError::Storage {
                        engine: ENGINE.to_string(),
                        message: format!("{} ({})", message, table),
                    });
                }
            }
        }
        Ok(None)
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R> {
        let tx = lock(&self.tx);
        if let Some(overlay) = tx.as_ref() {
            return Ok(f(&overlay.working));
        }
        drop(tx);
        let tables = self.shared.tables.read().map_err(|_| poisoned())?;
        Ok(f(&tables))
    }
}

#[async_trait]
impl Session for MemorySession {
    fn engine(&self) -> &'static str {
        ENGINE
    }

    async fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        fn declare(tables: &mut Tables, schema: &TableSchema) {
            tables
                .entry(schema.table.clone())
                .and_modify(|t| t.schema = schema.clone())
                .or_insert_with(|| MemTable::new(schema.clone()));
        }

        declare(
            &mut *self.shared.tables.write().map_err(|_| poisoned())?,
            schema,
        );
        if let Some(overlay) = lock(&self.tx).as_mut() {
            declare(&mut overlay.working, schema);
        }
        Ok(())
    }

    async fn query(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>> {
        self.read(|tables| {
            tables
                .get(table)
                .map(|t| t.select(query))
                .unwrap_or_default()
        })
    }

    async fn count(&self, table: &str, filter: Option<&Filter>) -> Result<u64> {
        self.read(|tables| {
            tables.get(table).map_or(0, |t| {
                t.rows
                    .values()
                    .filter(|row| filter.map_or(true, |f| f.matches(row)))
                    .count() as u64
            })
        })
    }

    async fn execute_batch(&self, batch: ChangeBatch) -> Result<i64> {
        if let Some(affected) = self.check_faults(&batch)? {
            return Ok(affected);
        }

        let mut tx = lock(&self.tx);
        if let Some(overlay) = tx.as_mut() {
            let affected = apply_batch(&mut overlay.working, &batch)?;
            overlay.log.push(batch);
            return Ok(affected);
        }
        drop(tx);

        let mut tables = self.shared.tables.write().map_err(|_| poisoned())?;
        apply_batch(&mut tables, &batch)
    }

    async fn begin(&self) -> Result<()> {
        let mut tx = lock(&self.tx);
        if tx.is_some() {
            return Err(TesseraError::TransactionState {
                tx_id: "open".to_string(),
                op: "begin".to_string(),
                reason: "session already has an open transaction".to_string(),
            });
        }
        let working = self.shared.tables.read().map_err(|_| poisoned())?.clone();
        *tx = Some(Overlay {
            working,
            log: Vec::new(),
        });
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let overlay = lock(&self.tx)
            .take()
            .ok_or_else(|| no_transaction("commit_transaction"))?;

        let mut tables = self.shared.tables.write().map_err(|_| poisoned())?;
        let mut replayed = tables.clone();
        for batch in &overlay.log {
            apply_batch(&mut replayed, batch)?;
        }
        *tables = replayed;
        tracing::debug!(engine = ENGINE, batches = overlay.log.len(), "transaction applied");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        if let Some(overlay) = lock(&self.tx).take() {
            tracing::debug!(engine = ENGINE, batches = overlay.log.len(), "transaction discarded");
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        lock(&self.tx).is_some()
    }
}
