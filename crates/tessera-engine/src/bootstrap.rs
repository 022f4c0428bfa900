//! Request context construction
//!
//! Every handler runs against a fresh `DbContext` whose session has the
//! catalog tables declared.

use std::sync::Arc;

use tessera_core::model::catalog_schemas;
use tessera_core::storage::Session;
use tessera_core::{DbContext, ExError};
use tessera_core_types::RequestContext;
use tessera_store::SqliteEngine;

/// Wrap a session in a request context and declare the catalog tables
///
/// # Errors
///
/// Returns the storage error raised while declaring a table.
pub async fn open_context(
    session: Arc<dyn Session>,
    request: RequestContext,
) -> Result<DbContext, ExError> {
    let ctx = DbContext::new(session, request);
    ctx.register_schemas(&catalog_schemas())
        .await
        .map_err(|e| {
            ExError::from(e)
                .with_op("open_context")
                .with_request_context(ctx.request())
        })?;
    Ok(ctx)
}

/// Request context on a fresh connection to a SQLite engine
///
/// # Errors
///
/// Returns `ERR_PERSISTENCE` if the connection cannot be opened.
pub async fn sqlite_context(
    engine: &SqliteEngine,
    request: RequestContext,
) -> Result<DbContext, ExError> {
    let session = engine.session().map_err(|e| {
        ExError::from(e)
            .with_op("sqlite_context")
            .with_request_context(&request)
    })?;
    open_context(Arc::new(session), request).await
}
