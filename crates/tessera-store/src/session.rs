//! SQLite implementation of the storage port
//!
//! Each session owns one connection. Statements run on the blocking pool so
//! async handlers never stall the runtime. A batch runs inside a savepoint,
//! which nests inside an open transaction and otherwise commits on release.

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use tessera_core::errors::TesseraError;
use tessera_core::spec::Filter;
use tessera_core::storage::{Change, ChangeBatch, RowQuery, Session, TableSchema};

use crate::db;
use crate::errors::{from_rusqlite, join_error, poisoned, Result, ENGINE};
use crate::migrations::apply_migrations;
use crate::sql::{compile_count, compile_select, unique_index_ddl};

/// File-backed SQLite engine handing out one connection per session
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    path: PathBuf,
}

impl SqliteEngine {
    /// Open (or create) the database file and apply pending migrations
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the file cannot be opened or a migration fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut conn = db::open(&path)?;
        apply_migrations(&mut conn)?;
        tracing::debug!(engine = ENGINE, path = %path.display(), "engine opened");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a request-scoped session on a fresh connection
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the connection cannot be opened.
    pub fn session(&self) -> Result<SqliteSession> {
        Ok(SqliteSession::from_connection(db::open(&self.path)?))
    }
}

/// Session over one SQLite connection
///
/// `tx_epoch` moves on every `begin` and `rollback`; a `BEGIN` that reaches
/// the connection under a stale epoch is undone. `rollback_pending` holds a
/// rollback that could not take the connection, and the next statement runs
/// it first.
pub struct SqliteSession {
    conn: Arc<Mutex<Connection>>,
    tx_open: AtomicBool,
    tx_epoch: Arc<AtomicU64>,
    rollback_pending: Arc<AtomicBool>,
}

impl SqliteSession {
    /// Private in-memory database with migrations applied
    ///
    /// # Errors
    ///
    /// Returns `Storage` if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = db::open_in_memory()?;
        apply_migrations(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            tx_open: AtomicBool::new(false),
            tx_epoch: Arc::new(AtomicU64::new(0)),
            rollback_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn with_conn<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let pending = Arc::clone(&self.rollback_pending);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| poisoned())?;
            if pending.swap(false, Ordering::SeqCst) {
                discard(&guard)?;
            }
            f(&mut guard)
        })
        .await
        .map_err(join_error)?
    }
}

/// Roll back whatever transaction the connection holds
fn discard(conn: &Connection) -> Result<()> {
    // SQLite may already have rolled back on its own after certain errors
    if !conn.is_autocommit() {
        conn.execute_batch("ROLLBACK").map_err(from_rusqlite)?;
    }
    tracing::debug!(engine = ENGINE, "transaction discarded");
    Ok(())
}

fn transaction_state(op: &str, reason: &str) -> TesseraError {
    TesseraError::TransactionState {
        tx_id: ENGINE.to_string(),
        op: op.to_string(),
        reason: reason.to_string(),
    }
}

fn encode(row: &Value) -> Result<String> {
    serde_json::to_string(row).map_err(TesseraError::from)
}

fn decode(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(TesseraError::from)
}

fn apply_change(conn: &Connection, change: &Change) -> Result<i64> {
    let affected = match change {
        Change::Insert { table, id, row } => conn.execute(
            "INSERT INTO records (table_name, id, body) VALUES (?1, ?2, ?3)",
            params![table, id.to_string(), encode(row)?],
        ),
        Change::Update { table, id, row } => conn.execute(
            "UPDATE records SET body = ?3 WHERE table_name = ?1 AND id = ?2",
            params![table, id.to_string(), encode(row)?],
        ),
        Change::Delete { table, id } => conn.execute(
            "DELETE FROM records WHERE table_name = ?1 AND id = ?2",
            params![table, id.to_string()],
        ),
    }
    .map_err(from_rusqlite)?;
    Ok(affected as i64)
}

fn apply_batch(conn: &Connection, batch: &ChangeBatch) -> Result<i64> {
    conn.execute_batch("SAVEPOINT batch")
        .map_err(from_rusqlite)?;

    let applied = batch
        .changes
        .iter()
        .try_fold(0_i64, |total, change| -> Result<i64> {
            Ok(total + apply_change(conn, change)?)
        });

    match applied {
        Ok(affected) => {
            conn.execute_batch("RELEASE batch").map_err(from_rusqlite)?;
            Ok(affected)
        }
        Err(e) => {
            if let Err(undo) = conn.execute_batch("ROLLBACK TO batch; RELEASE batch") {
                tracing::warn!(engine = ENGINE, error = %undo, "savepoint rollback failed");
            }
            Err(e)
        }
    }
}

#[async_trait]
impl Session for SqliteSession {
    fn engine(&self) -> &'static str {
        ENGINE
    }

    async fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        let indexes = schema
            .unique_fields
            .iter()
            .map(|field| unique_index_ddl(&schema.table, field))
            .collect::<Result<Vec<_>>>()?;
        let table = schema.table.clone();
        let fields = serde_json::to_string(&schema.unique_fields)?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO table_schemas (table_name, unique_fields, declared_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(table_name) DO UPDATE SET unique_fields = excluded.unique_fields",
                params![table, fields, chrono::Utc::now().timestamp()],
            )
            .map_err(from_rusqlite)?;
            for ddl in &indexes {
                conn.execute_batch(ddl).map_err(from_rusqlite)?;
            }
            Ok(())
        })
        .await
    }

    async fn query(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>> {
        let select = compile_select(table, query)?;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&select.sql).map_err(from_rusqlite)?;
            let bodies = stmt
                .query_map(params_from_iter(select.params.iter()), |row| {
                    row.get::<_, String>(0)
                })
                .map_err(from_rusqlite)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(from_rusqlite)?;
            bodies.iter().map(|body| decode(body)).collect()
        })
        .await
    }

    async fn count(&self, table: &str, filter: Option<&Filter>) -> Result<u64> {
        let count = compile_count(table, filter)?;
        self.with_conn(move |conn| {
            let n: i64 = conn
                .query_row(&count.sql, params_from_iter(count.params.iter()), |row| {
                    row.get(0)
                })
                .map_err(from_rusqlite)?;
            Ok(n.max(0) as u64)
        })
        .await
    }

    async fn execute_batch(&self, batch: ChangeBatch) -> Result<i64> {
        let affected = self.with_conn(move |conn| apply_batch(conn, &batch)).await?;
        tracing::debug!(engine = ENGINE, affected, "batch applied");
        Ok(affected)
    }

    async fn begin(&self) -> Result<()> {
        if self.tx_open.swap(true, Ordering::SeqCst) {
            return Err(transaction_state(
                "begin",
                "session already has an open transaction",
            ));
        }
        let epoch = self.tx_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.tx_epoch);
        let started = self
            .with_conn(move |conn| {
                if current.load(Ordering::SeqCst) != epoch {
                    return Err(transaction_state("begin", "rolled back before it started"));
                }
                // Take the write lock up front so a later write cannot deadlock
                conn.execute_batch("BEGIN IMMEDIATE").map_err(from_rusqlite)?;
                if current.load(Ordering::SeqCst) != epoch {
                    discard(conn)?;
                    return Err(transaction_state("begin", "rolled back while starting"));
                }
                Ok(())
            })
            .await;
        if started.is_err() {
            self.tx_open.store(false, Ordering::SeqCst);
        }
        started
    }

    async fn commit_transaction(&self) -> Result<()> {
        if !self.tx_open.load(Ordering::SeqCst) {
            return Err(transaction_state(
                "commit_transaction",
                "session has no open transaction",
            ));
        }
        let committed = self
            .with_conn(|conn| {
                let result = conn.execute_batch("COMMIT").map_err(from_rusqlite);
                if result.is_err() && !conn.is_autocommit() {
                    conn.execute_batch("ROLLBACK").map_err(from_rusqlite)?;
                }
                result
            })
            .await;
        self.tx_open.store(false, Ordering::SeqCst);
        committed
    }

    fn rollback(&self) -> Result<()> {
        if !self.tx_open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.tx_epoch.fetch_add(1, Ordering::SeqCst);
        match self.conn.try_lock() {
            Ok(conn) => discard(&conn),
            Err(TryLockError::WouldBlock) => {
                // A statement still holds the connection; the next one rolls back first
                self.rollback_pending.store(true, Ordering::SeqCst);
                tracing::debug!(engine = ENGINE, "rollback deferred");
                Ok(())
            }
            Err(TryLockError::Poisoned(_)) => Err(poisoned()),
        }
    }

    fn in_transaction(&self) -> bool {
        self.tx_open.load(Ordering::SeqCst)
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if let Err(e) = Session::rollback(self) {
            tracing::warn!(engine = ENGINE, error = %e, "rollback on drop failed");
        }
    }
}
