use std::sync::{Arc, Mutex};

use tessera_core_types::RequestContext;

use super::transaction::{lock, AmbientSlot, TransactionHandle};
use super::unit_of_work::UnitOfWork;
use crate::errors::Result;
use crate::model::Entity;
use crate::storage::{Session, TableSchema};

/// Request-scoped database context
///
/// Owns the session and the ambient transaction slot for one handler
/// invocation. Never shared across requests.
pub struct DbContext {
    session: Arc<dyn Session>,
    request: RequestContext,
    ambient: AmbientSlot,
}

impl DbContext {
    pub fn new(session: Arc<dyn Session>, request: RequestContext) -> Self {
        Self {
            session,
            request,
            ambient: Arc::new(Mutex::new(None)),
        }
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    /// Fresh unit of work over this context's session
    ///
    /// Its commits join whatever transaction is open on this context at
    /// commit time.
    pub fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::new(self.session.clone(), self.ambient.clone())
    }

    /// Open the ambient transaction
    ///
    /// # Errors
    ///
    /// Returns `TransactionState` while another handle from this context is
    /// open, or the storage error raised by `begin`.
    pub async fn begin_transaction(&self) -> Result<TransactionHandle> {
        TransactionHandle::open(self.session.clone(), self.ambient.clone()).await
    }

    pub fn in_transaction(&self) -> bool {
        lock(&self.ambient).is_some()
    }

    /// Declare the table for `E`
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn register<E: Entity>(&self) -> Result<()> {
        self.session.ensure_table(&E::schema()).await
    }

    /// Declare several tables
    ///
    /// # Errors
    ///
    /// Propagates the first storage error.
    pub async fn register_schemas(&self, schemas: &[TableSchema]) -> Result<()> {
        for schema in schemas {
            self.session.ensure_table(schema).await?;
        }
        Ok(())
    }
}
