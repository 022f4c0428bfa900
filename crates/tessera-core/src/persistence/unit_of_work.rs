use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::repository::Repository;
use super::transaction::{lock, AmbientSlot};
use crate::errors::{Result, TesseraError};
use crate::model::Entity;
use crate::storage::{Change, ChangeBatch, Session};
use crate::{log_op_end, log_op_error, log_op_start};

/// Affected-row outcome of a commit
///
/// Zero affected rows is a failure signal even though storage raised
/// nothing; call sites must branch on it or call [`SaveOutcome::require`].
#[must_use = "a commit that wrote nothing is a failure signal"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Persisted(u64),
    NothingWritten,
}

impl SaveOutcome {
    pub fn from_affected(affected: i64) -> Self {
        match u64::try_from(affected) {
            Ok(n) if n > 0 => SaveOutcome::Persisted(n),
            _ => SaveOutcome::NothingWritten,
        }
    }

    pub fn affected(&self) -> u64 {
        match self {
            SaveOutcome::Persisted(n) => *n,
            SaveOutcome::NothingWritten => 0,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, SaveOutcome::Persisted(_))
    }

    /// Affected row count, or `PersistenceFailure` when nothing was written
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` naming `op` for `NothingWritten`.
    pub fn require(self, op: &str) -> Result<u64> {
        match self {
            SaveOutcome::Persisted(n) => Ok(n),
            SaveOutcome::NothingWritten => Err(TesseraError::PersistenceFailure {
                op: op.to_string(),
                affected: 0,
            }),
        }
    }
}

/// Staged writes committed together
///
/// Repositories obtained from one unit of work stage into its change set.
/// Nothing reaches storage until [`UnitOfWork::commit`].
pub struct UnitOfWork {
    session: Arc<dyn Session>,
    slot: AmbientSlot,
    changes: Mutex<Vec<Change>>,
}

impl UnitOfWork {
    pub(crate) fn new(session: Arc<dyn Session>, slot: AmbientSlot) -> Self {
        Self {
            session,
            slot,
            changes: Mutex::new(Vec::new()),
        }
    }

    pub fn repository<E: Entity>(&self) -> Repository<'_, E> {
        Repository::new(self)
    }

    pub(crate) fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    pub(crate) fn stage(&self, change: Change) {
        lock(&self.changes).push(change);
    }

    /// Whether a staged insert or update of `table` sets `field` to `value`
    pub(crate) fn stages_value(&self, table: &str, field: &str, value: &Value) -> bool {
        lock(&self.changes).iter().any(|change| match change {
            Change::Insert { table: t, row, .. } | Change::Update { table: t, row, .. } => {
                t == table && row.get(field) == Some(value)
            }
            Change::Delete { .. } => false,
        })
    }

    /// Number of staged changes
    pub fn pending(&self) -> usize {
        lock(&self.changes).len()
    }

    /// Drop every staged change, returning how many were dropped
    pub fn discard(&self) -> usize {
        let mut changes = lock(&self.changes);
        let dropped = changes.len();
        changes.clear();
        dropped
    }

    /// Persist every staged change as one atomic batch
    ///
    /// The change set is cleared once the batch has been handed to storage,
    /// whether or not it succeeded. With an open transaction on the owning
    /// context the batch joins it; a failed or empty write marks that
    /// transaction as unable to complete.
    ///
    /// # Errors
    ///
    /// Propagates storage errors, including `UniquenessConflict`.
    pub async fn commit(&self) -> Result<SaveOutcome> {
        let changes = std::mem::take(&mut *lock(&self.changes));
        if changes.is_empty() {
            return Ok(SaveOutcome::NothingWritten);
        }

        let staged = changes.len();
        let ambient = lock(&self.slot).clone();
        let start = Instant::now();
        log_op_start!("commit", staged = staged, engine = self.session.engine());

        match self.session.execute_batch(ChangeBatch::new(changes)).await {
            Ok(affected) => {
                let outcome = SaveOutcome::from_affected(affected);
                if let Some(tx) = &ambient {
                    tx.join();
                    if !outcome.is_persisted() {
                        tx.abort(format!("commit of {} changes wrote nothing", staged));
                    }
                }
                log_op_end!(
                    "commit",
                    duration_ms = start.elapsed().as_millis() as u64,
                    affected_rows = affected,
                    staged = staged
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Some(tx) = &ambient {
                    if e.kind().aborts_transaction() {
                        tx.abort(e.to_string());
                    }
                }
                log_op_error!(
                    "commit",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    staged = staged
                );
                Err(e)
            }
        }
    }
}
