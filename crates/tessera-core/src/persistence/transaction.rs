//! Cross-aggregate transaction handle
//!
//! `Open` ends in exactly one of `Completed` (every joined commit durable) or
//! `RolledBack` (nothing persisted). Dropping an open handle rolls back, which
//! also covers a handler future cancelled mid-flight.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tessera_core_types::schema::{EVENT_TX_BEGIN, EVENT_TX_COMPLETE, EVENT_TX_ROLLBACK};
use tessera_core_types::TransactionId;

use crate::errors::{Result, TesseraError};
use crate::storage::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Open,
    Completed,
    RolledBack,
}

/// State shared between a handle and the commits that join it
#[derive(Debug)]
pub(crate) struct TxShared {
    id: TransactionId,
    joined: AtomicU32,
    abort_reason: Mutex<Option<String>>,
}

impl TxShared {
    fn new() -> Self {
        Self {
            id: TransactionId::new(),
            joined: AtomicU32::new(0),
            abort_reason: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> &TransactionId {
        &self.id
    }

    pub(crate) fn join(&self) -> u32 {
        self.joined.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Mark the transaction as unable to complete; the first reason wins
    pub(crate) fn abort(&self, reason: impl Into<String>) {
        let mut slot = lock(&self.abort_reason);
        if slot.is_none() {
            *slot = Some(reason.into());
        }
    }

    fn abort_reason(&self) -> Option<String> {
        lock(&self.abort_reason).clone()
    }
}

/// The context's single ambient transaction slot
pub(crate) type AmbientSlot = Arc<Mutex<Option<Arc<TxShared>>>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Request-scoped transaction joining every commit issued on its context
///
/// Obtained from [`DbContext::begin_transaction`](super::DbContext::begin_transaction).
pub struct TransactionHandle {
    shared: Arc<TxShared>,
    slot: AmbientSlot,
    session: Arc<dyn Session>,
    state: TxState,
    started: Instant,
}

impl TransactionHandle {
    /// Begin on `session` and occupy `slot`
    pub(crate) async fn open(session: Arc<dyn Session>, slot: AmbientSlot) -> Result<Self> {
        let shared = Arc::new(TxShared::new());
        {
            let mut ambient = lock(&slot);
            if let Some(existing) = ambient.as_ref() {
                return Err(TesseraError::TransactionState {
                    tx_id: existing.id().to_string(),
                    op: "begin_transaction".to_string(),
                    reason: "a transaction is already open on this context".to_string(),
                });
            }
            *ambient = Some(shared.clone());
        }

        let mut pending = PendingBegin {
            shared: shared.clone(),
            slot: slot.clone(),
            session: session.clone(),
            armed: true,
        };
        let begun = session.begin().await;
        pending.armed = false;
        if let Err(e) = begun {
            lock(&slot).take();
            return Err(e);
        }

        tracing::debug!(
            component = module_path!(),
            event = EVENT_TX_BEGIN,
            tx_id = %shared.id(),
            engine = session.engine(),
        );

        Ok(Self {
            shared,
            slot,
            session,
            state: TxState::Open,
            started: Instant::now(),
        })
    }

    pub fn id(&self) -> &TransactionId {
        self.shared.id()
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Unit-of-work commits that reached storage while this handle was open
    pub fn joined_commits(&self) -> u32 {
        self.shared.joined.load(Ordering::SeqCst)
    }

    /// Make every joined commit durable
    ///
    /// # Errors
    ///
    /// - `TransactionState` if the handle is not open, or a joined commit
    ///   failed or wrote nothing (the transaction is rolled back)
    /// - storage errors from the final commit (the transaction is rolled back)
    pub async fn complete(&mut self) -> Result<()> {
        self.ensure_open("complete")?;

        if let Some(reason) = self.shared.abort_reason() {
            self.finish_rollback();
            return Err(TesseraError::TransactionState {
                tx_id: self.id().to_string(),
                op: "complete".to_string(),
                reason: format!("aborted by a failed commit: {}", reason),
            });
        }

        match self.session.commit_transaction().await {
            Ok(()) => {
                self.state = TxState::Completed;
                self.release();
                tracing::debug!(
                    component = module_path!(),
                    event = EVENT_TX_COMPLETE,
                    tx_id = %self.id(),
                    joined = self.joined_commits(),
                    duration_ms = self.started.elapsed().as_millis() as u64,
                );
                Ok(())
            }
            Err(e) => {
                self.finish_rollback();
                Err(e)
            }
        }
    }

    /// Roll back now instead of at drop
    ///
    /// # Errors
    ///
    /// Returns `TransactionState` if the handle is not open.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open("rollback")?;
        self.finish_rollback();
        Ok(())
    }

    fn ensure_open(&self, op: &str) -> Result<()> {
        if self.state == TxState::Open {
            return Ok(());
        }
        Err(TesseraError::TransactionState {
            tx_id: self.id().to_string(),
            op: op.to_string(),
            reason: format!("transaction is {:?}", self.state),
        })
    }

    fn finish_rollback(&mut self) {
        if let Err(e) = self.session.rollback() {
            tracing::warn!(
                component = module_path!(),
                tx_id = %self.id(),
                error = %e,
                "storage rollback failed",
            );
        }
        self.state = TxState::RolledBack;
        self.release();
        tracing::debug!(
            component = module_path!(),
            event = EVENT_TX_ROLLBACK,
            tx_id = %self.id(),
            joined = self.joined_commits(),
            duration_ms = self.started.elapsed().as_millis() as u64,
        );
    }

    fn release(&self) {
        let mut ambient = lock(&self.slot);
        if ambient
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &self.shared))
        {
            ambient.take();
        }
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        if self.state == TxState::Open {
            self.finish_rollback();
        }
    }
}

/// Undoes a `begin` whose caller went away before the handle existed
///
/// Armed only across the `begin` await. Storage may still be starting the
/// transaction when this runs, so the session rollback must cope with a
/// `begin` that lands after it.
struct PendingBegin {
    shared: Arc<TxShared>,
    slot: AmbientSlot,
    session: Arc<dyn Session>,
    armed: bool,
}

impl Drop for PendingBegin {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.session.rollback() {
            tracing::warn!(
                component = module_path!(),
                tx_id = %self.shared.id(),
                error = %e,
                "rollback of abandoned begin failed",
            );
        }
        let mut ambient = lock(&self.slot);
        if ambient
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &self.shared))
        {
            ambient.take();
        }
        tracing::debug!(
            component = module_path!(),
            event = EVENT_TX_ROLLBACK,
            tx_id = %self.shared.id(),
            "begin abandoned",
        );
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", self.id())
            .field("state", &self.state)
            .field("joined_commits", &self.joined_commits())
            .finish()
    }
}
