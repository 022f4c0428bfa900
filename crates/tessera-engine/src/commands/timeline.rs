//! Timeline command handlers with boundary logging.
//!
//! Each handler runs as one ambient transaction. A media item and the
//! timeline entry linking it are committed in separate steps, so the
//! transaction is what keeps a half-attached item from ever being visible.

use std::time::Instant;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tessera_core::errors::{ExError, TesseraError};
use tessera_core::model::{EntityId, MediaItem, MediaKind, Timeline, TimelineEntry};
use tessera_core::ordering::{assign_batch_positions, next_position, remove_and_compact, reorder};
use tessera_core::{log_op_end, log_op_start, DbContext, IdentifierGenerator};

use super::{fail, require_existing, required_text};

/// Media to create and append to a timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMedia {
    pub title: String,
    pub kind: MediaKind,
}

impl NewMedia {
    pub fn new(title: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            title: title.into(),
            kind,
        }
    }
}

/// A created media item and the entry placing it on a timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedMedia {
    pub media: MediaItem,
    pub entry: TimelineEntry,
}

/// Create an empty timeline
///
/// ## Errors
///
/// - `ERR_VALIDATION`: blank title
/// - `ERR_PERSISTENCE_FAILURE`: the insert reported no affected rows
pub async fn create_timeline(ctx: &DbContext, title: &str) -> Result<Timeline, ExError> {
    log_op_start!("create_timeline", request_id = %ctx.request().request_id);
    let start = Instant::now();

    let timeline = create_timeline_impl(ctx, title)
        .await
        .map_err(|e| fail("create_timeline", ctx, e, start))?;

    log_op_end!(
        "create_timeline",
        duration_ms = start.elapsed().as_millis() as u64,
        entity_id = %timeline.id
    );
    Ok(timeline)
}

async fn create_timeline_impl(ctx: &DbContext, title: &str) -> Result<Timeline, TesseraError> {
    let timeline = Timeline::new(required_text("create_timeline", "title", title)?);
    let uow = ctx.unit_of_work();
    uow.repository::<Timeline>().create(&timeline)?;
    uow.commit().await?.require("create_timeline")?;
    Ok(timeline)
}

/// Create a media item and append it to the end of a timeline
///
/// ## Errors
///
/// - `ERR_VALIDATION`: blank title
/// - `ERR_NOT_FOUND`: the timeline does not exist
/// - `ERR_EXHAUSTED`: no free public id within the attempt cap
/// - `ERR_PERSISTENCE_FAILURE` / `ERR_UNIQUENESS_CONFLICT`: a step wrote
///   nothing or collided; neither the item nor the entry is kept
pub async fn attach_media<R: RngCore + CryptoRng>(
    ctx: &DbContext,
    ids: &mut IdentifierGenerator<R>,
    timeline_id: EntityId,
    media: NewMedia,
) -> Result<AttachedMedia, ExError> {
    log_op_start!(
        "attach_media",
        request_id = %ctx.request().request_id,
        parent_id = %timeline_id
    );
    let start = Instant::now();

    let attached = attach_media_impl(ctx, ids, timeline_id, media)
        .await
        .map_err(|e| fail("attach_media", ctx, e, start))?;

    log_op_end!(
        "attach_media",
        duration_ms = start.elapsed().as_millis() as u64,
        entity_id = %attached.media.id,
        position = attached.entry.position
    );
    Ok(attached)
}

async fn attach_media_impl<R: RngCore + CryptoRng>(
    ctx: &DbContext,
    ids: &mut IdentifierGenerator<R>,
    timeline_id: EntityId,
    media: NewMedia,
) -> Result<AttachedMedia, TesseraError> {
    let title = required_text("attach_media", "title", &media.title)?;

    let mut tx = ctx.begin_transaction().await?;
    let uow = ctx.unit_of_work();
    require_existing::<Timeline>(&uow, timeline_id).await?;

    let public_id = ids.mint::<MediaItem>(&uow).await?;
    let item = MediaItem::new(public_id, title, media.kind);
    uow.repository::<MediaItem>().create(&item)?;
    uow.commit().await?.require("attach_media.create_media")?;

    let position = next_position::<TimelineEntry>(&uow, timeline_id).await?;
    let entry = TimelineEntry::new(timeline_id, item.id, position);
    uow.repository::<TimelineEntry>().create(&entry)?;
    uow.commit().await?.require("attach_media.link_entry")?;

    tx.complete().await?;
    Ok(AttachedMedia { media: item, entry })
}

/// Create several media items and append them in submission order
///
/// The whole batch is one commit; positions continue from the current end
/// of the timeline.
///
/// ## Errors
///
/// - `ERR_VALIDATION`: empty batch or a blank title
/// - `ERR_NOT_FOUND`: the timeline does not exist
/// - `ERR_EXHAUSTED`: not enough free public ids
/// - `ERR_PERSISTENCE_FAILURE` / `ERR_UNIQUENESS_CONFLICT`: nothing is kept
pub async fn attach_media_batch<R: RngCore + CryptoRng>(
    ctx: &DbContext,
    ids: &mut IdentifierGenerator<R>,
    timeline_id: EntityId,
    batch: Vec<NewMedia>,
) -> Result<Vec<AttachedMedia>, ExError> {
    log_op_start!(
        "attach_media_batch",
        request_id = %ctx.request().request_id,
        parent_id = %timeline_id,
        staged = batch.len()
    );
    let start = Instant::now();

    let attached = attach_media_batch_impl(ctx, ids, timeline_id, batch)
        .await
        .map_err(|e| fail("attach_media_batch", ctx, e, start))?;

    log_op_end!(
        "attach_media_batch",
        duration_ms = start.elapsed().as_millis() as u64,
        affected_rows = attached.len() * 2
    );
    Ok(attached)
}

async fn attach_media_batch_impl<R: RngCore + CryptoRng>(
    ctx: &DbContext,
    ids: &mut IdentifierGenerator<R>,
    timeline_id: EntityId,
    batch: Vec<NewMedia>,
) -> Result<Vec<AttachedMedia>, TesseraError> {
    if batch.is_empty() {
        return Err(TesseraError::validation(
            "attach_media_batch",
            "batch must contain at least one media item",
        ));
    }
    let titles = batch
        .iter()
        .map(|m| required_text("attach_media_batch", "title", &m.title))
        .collect::<Result<Vec<_>, _>>()?;

    let mut tx = ctx.begin_transaction().await?;
    let uow = ctx.unit_of_work();
    require_existing::<Timeline>(&uow, timeline_id).await?;

    let public_ids = ids.mint_many::<MediaItem>(&uow, batch.len()).await?;
    let items: Vec<MediaItem> = public_ids
        .into_iter()
        .zip(titles)
        .zip(&batch)
        .map(|((public_id, title), media)| MediaItem::new(public_id, title, media.kind))
        .collect();
    let mut entries: Vec<TimelineEntry> = items
        .iter()
        .map(|item| TimelineEntry::new(timeline_id, item.id, 0))
        .collect();
    assign_batch_positions(&uow, timeline_id, &mut entries).await?;

    uow.repository::<MediaItem>().create_range(&items)?;
    uow.repository::<TimelineEntry>().create_range(&entries)?;
    uow.commit().await?.require("attach_media_batch")?;

    tx.complete().await?;
    Ok(items
        .into_iter()
        .zip(entries)
        .map(|(media, entry)| AttachedMedia { media, entry })
        .collect())
}

/// Rewrite a timeline's order from a full permutation of its entry ids
///
/// ## Errors
///
/// - `ERR_NOT_FOUND`: the timeline does not exist or has no entries
/// - `ERR_MISMATCH`: the list length differs from the entry count
/// - `ERR_VALIDATION`: empty list, foreign or duplicate ids
/// - `ERR_PERSISTENCE_FAILURE`: the rewrite wrote nothing
pub async fn reorder_timeline(
    ctx: &DbContext,
    timeline_id: EntityId,
    ordered_entry_ids: &[EntityId],
) -> Result<u64, ExError> {
    log_op_start!(
        "reorder_timeline",
        request_id = %ctx.request().request_id,
        parent_id = %timeline_id,
        staged = ordered_entry_ids.len()
    );
    let start = Instant::now();

    let affected = reorder_timeline_impl(ctx, timeline_id, ordered_entry_ids)
        .await
        .map_err(|e| fail("reorder_timeline", ctx, e, start))?;

    log_op_end!(
        "reorder_timeline",
        duration_ms = start.elapsed().as_millis() as u64,
        affected_rows = affected
    );
    Ok(affected)
}

async fn reorder_timeline_impl(
    ctx: &DbContext,
    timeline_id: EntityId,
    ordered_entry_ids: &[EntityId],
) -> Result<u64, TesseraError> {
    let mut tx = ctx.begin_transaction().await?;
    let uow = ctx.unit_of_work();
    require_existing::<Timeline>(&uow, timeline_id).await?;

    let affected = reorder::<TimelineEntry>(&uow, timeline_id, ordered_entry_ids).await?;

    tx.complete().await?;
    Ok(affected)
}

/// Remove one entry from a timeline and close the gap it leaves
///
/// The media item itself is kept; it may still be tagged or placed on
/// other timelines.
///
/// ## Errors
///
/// - `ERR_NOT_FOUND`: the entry is not on this timeline
/// - `ERR_PERSISTENCE_FAILURE`: the delete wrote nothing
pub async fn detach_media(
    ctx: &DbContext,
    timeline_id: EntityId,
    entry_id: EntityId,
) -> Result<u64, ExError> {
    log_op_start!(
        "detach_media",
        request_id = %ctx.request().request_id,
        parent_id = %timeline_id,
        entity_id = %entry_id
    );
    let start = Instant::now();

    let affected = detach_media_impl(ctx, timeline_id, entry_id)
        .await
        .map_err(|e| fail("detach_media", ctx, e, start))?;

    log_op_end!(
        "detach_media",
        duration_ms = start.elapsed().as_millis() as u64,
        affected_rows = affected
    );
    Ok(affected)
}

async fn detach_media_impl(
    ctx: &DbContext,
    timeline_id: EntityId,
    entry_id: EntityId,
) -> Result<u64, TesseraError> {
    let mut tx = ctx.begin_transaction().await?;
    let uow = ctx.unit_of_work();

    let affected = remove_and_compact::<TimelineEntry>(&uow, timeline_id, entry_id).await?;

    tx.complete().await?;
    Ok(affected)
}
