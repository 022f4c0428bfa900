//! Command orchestration layer.
//!
//! ## Logging Ownership
//!
//! The engine layer owns lifecycle logging for composite writes:
//! - `log_op_start!` at entry
//! - `log_op_end!` on success
//! - `log_op_error!` on failure
//!
//! Lower layers (store, core) use only `tracing::debug!()` for internal
//! details, except the ordering operations, which log their own lifecycle.

pub mod engine_command;
pub mod tags;
pub mod timeline;

use std::time::Instant;

use tessera_core::errors::{ExError, TesseraError};
use tessera_core::model::{Entity, EntityId};
use tessera_core::{log_op_error, DbContext, UnitOfWork};

/// Log a failed handler and convert the error for the caller
pub(crate) fn fail(op: &str, ctx: &DbContext, err: TesseraError, start: Instant) -> ExError {
    log_op_error!(
        op,
        err.clone(),
        duration_ms = start.elapsed().as_millis() as u64,
        request_id = %ctx.request().request_id
    );
    ExError::from(err)
        .with_op(op)
        .with_request_context(ctx.request())
}

/// Load `E` by id or fail with `NotFound`
pub(crate) async fn require_existing<E: Entity>(uow: &UnitOfWork, id: EntityId) -> Result<E, TesseraError> {
    uow.repository::<E>()
        .get_by_id(id)
        .await?
        .ok_or_else(|| TesseraError::not_found(E::TABLE, id))
}

/// Trimmed, non-empty display text
pub(crate) fn required_text(op: &str, field: &str, value: &str) -> Result<String, TesseraError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TesseraError::validation(op, format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}
