//! Dense per-parent positions
//!
//! For every parent the live children hold exactly the positions `{1..N}`
//! between operations. Appends take `max + 1`; a reorder rewrites every
//! child's position from a full permutation of the child ids.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::errors::{Result, TesseraError};
use crate::model::{EntityId, Ordered};
use crate::persistence::UnitOfWork;
use crate::spec::{Filter, OrderBy};
use crate::storage::RowQuery;
use crate::{log_op_end, log_op_error, log_op_start};

/// Children of `parent_id`, ascending by position
async fn children_of<E: Ordered>(uow: &UnitOfWork, parent_id: EntityId) -> Result<Vec<E>> {
    let mut children = uow
        .repository::<E>()
        .find_all(Some(Filter::refers_to(E::PARENT_FIELD, parent_id)))
        .await?
        .to_vec()?;
    children.sort_by_key(|c| c.position());
    Ok(children)
}

/// Position for one new child: `1 + max(existing)`, or 1 with no children
///
/// Reads committed state (or the open transaction's). Two appends racing
/// outside a transaction can read the same maximum.
///
/// # Errors
///
/// Propagates storage errors.
pub async fn next_position<E: Ordered>(uow: &UnitOfWork, parent_id: EntityId) -> Result<u32> {
    let query = RowQuery::filtered(Some(Filter::refers_to(E::PARENT_FIELD, parent_id)))
        .ordered_by(OrderBy::desc(E::POSITION_FIELD))
        .limit(1);
    let rows = uow.session().query(E::TABLE, &query).await?;
    let max = match rows.into_iter().next() {
        Some(row) => E::from_row(row)?.position(),
        None => 0,
    };
    Ok(max + 1)
}

/// Assign `max+1 ..= max+k` to `children` in submission order
///
/// The maximum is read once for the whole batch. Positions are only
/// assigned; staging the inserts is up to the caller.
///
/// # Errors
///
/// Returns `Validation` if a child belongs to another parent.
pub async fn assign_batch_positions<E: Ordered>(
    uow: &UnitOfWork,
    parent_id: EntityId,
    children: &mut [E],
) -> Result<()> {
    if let Some(stray) = children.iter().find(|c| c.parent_id() != parent_id) {
        return Err(TesseraError::validation(
            "assign_batch_positions",
            format!("child {} belongs to parent {}", stray.id(), stray.parent_id()),
        ));
    }
    if children.is_empty() {
        return Ok(());
    }

    let first = next_position::<E>(uow, parent_id).await?;
    for (offset, child) in children.iter_mut().enumerate() {
        child.set_position(first + offset as u32);
    }
    Ok(())
}

/// Rewrite every child's position from a full permutation of child ids
///
/// `ordered_ids[i]` gets position `i + 1`. The updates are committed through
/// `uow` together with anything already staged there.
///
/// # Errors
///
/// Checked in this order, before anything is staged:
/// - `Validation` if `ordered_ids` is empty
/// - `NotFound` if the parent has no children
/// - `Mismatch` if the list length differs from the child count
/// - `Validation` if an id is not a child of the parent or appears twice
///
/// Then `PersistenceFailure` if the commit reports zero affected rows.
pub async fn reorder<E: Ordered>(
    uow: &UnitOfWork,
    parent_id: EntityId,
    ordered_ids: &[EntityId],
) -> Result<u64> {
    log_op_start!("reorder", table = E::TABLE, parent_id = %parent_id, staged = ordered_ids.len());
    let start = Instant::now();

    let affected = reorder_impl::<E>(uow, parent_id, ordered_ids)
        .await
        .map_err(|e| {
            log_op_error!(
                "reorder",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

    log_op_end!(
        "reorder",
        duration_ms = start.elapsed().as_millis() as u64,
        affected_rows = affected
    );
    Ok(affected)
}

async fn reorder_impl<E: Ordered>(
    uow: &UnitOfWork,
    parent_id: EntityId,
    ordered_ids: &[EntityId],
) -> Result<u64> {
    if ordered_ids.is_empty() {
        return Err(TesseraError::validation("reorder", "ordered id list is empty"));
    }

    let children = children_of::<E>(uow, parent_id).await?;
    if children.is_empty() {
        return Err(TesseraError::not_found(E::TABLE, parent_id));
    }
    if ordered_ids.len() != children.len() {
        return Err(TesseraError::Mismatch {
            parent_id: parent_id.to_string(),
            expected: children.len(),
            actual: ordered_ids.len(),
        });
    }

    let mut by_id: HashMap<EntityId, E> = children.into_iter().map(|c| (c.id(), c)).collect();
    let mut seen = HashSet::with_capacity(ordered_ids.len());
    for id in ordered_ids {
        if !seen.insert(*id) {
            return Err(TesseraError::validation(
                "reorder",
                format!("id {} is listed more than once", id),
            ));
        }
        if !by_id.contains_key(id) {
            return Err(TesseraError::validation(
                "reorder",
                format!("id {} is not a child of {}", id, parent_id),
            ));
        }
    }

    let mut reordered = Vec::with_capacity(ordered_ids.len());
    for (index, id) in ordered_ids.iter().enumerate() {
        let mut child = by_id.remove(id).ok_or_else(|| TesseraError::Internal {
            message: format!("validated id {} vanished", id),
        })?;
        child.set_position(index as u32 + 1);
        reordered.push(child);
    }

    let repo = uow.repository::<E>();
    for child in &reordered {
        repo.update(child)?;
    }
    uow.commit().await?.require("reorder")
}

/// Delete one child and close the gap it leaves
///
/// Later siblings move down by one so the parent keeps `{1..N-1}`.
///
/// # Errors
///
/// Returns `NotFound` if `child_id` is not a child of `parent_id`, and
/// `PersistenceFailure` if the commit wrote nothing.
pub async fn remove_and_compact<E: Ordered>(
    uow: &UnitOfWork,
    parent_id: EntityId,
    child_id: EntityId,
) -> Result<u64> {
    log_op_start!("remove_and_compact", table = E::TABLE, parent_id = %parent_id, entity_id = %child_id);
    let start = Instant::now();

    let affected = remove_and_compact_impl::<E>(uow, parent_id, child_id)
        .await
        .map_err(|e| {
            log_op_error!(
                "remove_and_compact",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

    log_op_end!(
        "remove_and_compact",
        duration_ms = start.elapsed().as_millis() as u64,
        affected_rows = affected
    );
    Ok(affected)
}

async fn remove_and_compact_impl<E: Ordered>(
    uow: &UnitOfWork,
    parent_id: EntityId,
    child_id: EntityId,
) -> Result<u64> {
    let mut children = children_of::<E>(uow, parent_id).await?;
    let index = children
        .iter()
        .position(|c| c.id() == child_id)
        .ok_or_else(|| TesseraError::not_found(E::TABLE, child_id))?;
    let removed = children.remove(index);

    let repo = uow.repository::<E>();
    repo.delete(&removed);
    for (offset, sibling) in children.iter_mut().enumerate() {
        let position = offset as u32 + 1;
        if sibling.position() != position {
            sibling.set_position(position);
            repo.update(sibling)?;
        }
    }
    uow.commit().await?.require("remove_and_compact")
}

/// Check that the children of `parent_id` hold exactly `{1..N}`
///
/// Returns `N`.
///
/// # Errors
///
/// Returns `InvariantViolation` listing the positions found.
pub async fn verify_dense<E: Ordered>(uow: &UnitOfWork, parent_id: EntityId) -> Result<u32> {
    let positions: Vec<u32> = children_of::<E>(uow, parent_id)
        .await?
        .iter()
        .map(Ordered::position)
        .collect();

    let dense = positions
        .iter()
        .enumerate()
        .all(|(index, p)| *p == index as u32 + 1);
    if !dense {
        return Err(TesseraError::InvariantViolation {
            table: E::TABLE.to_string(),
            parent_id: parent_id.to_string(),
            reason: format!("positions {:?}, expected 1..={}", positions, positions.len()),
        });
    }
    Ok(positions.len() as u32)
}
