//! Tag command handlers with boundary logging.

use std::time::Instant;

use rand::{CryptoRng, RngCore};
use tessera_core::errors::{ExError, TesseraError};
use tessera_core::model::{Entity, EntityId, MediaItem, MediaTag, Tag};
use tessera_core::{log_op_end, log_op_start, DbContext, Filter, IdentifierGenerator};

use super::{fail, require_existing, required_text};

/// Create a tag with a freshly minted public id
///
/// Name uniqueness is checked before writing; a concurrent request racing
/// past the check is stopped by the storage unique index on `name`.
///
/// ## Errors
///
/// - `ERR_VALIDATION`: blank name
/// - `ERR_UNIQUENESS_CONFLICT`: the name is taken
/// - `ERR_EXHAUSTED`: no free public id within the attempt cap
pub async fn create_tag<R: RngCore + CryptoRng>(
    ctx: &DbContext,
    ids: &mut IdentifierGenerator<R>,
    name: &str,
) -> Result<Tag, ExError> {
    log_op_start!("create_tag", request_id = %ctx.request().request_id);
    let start = Instant::now();

    let tag = create_tag_impl(ctx, ids, name)
        .await
        .map_err(|e| fail("create_tag", ctx, e, start))?;

    log_op_end!(
        "create_tag",
        duration_ms = start.elapsed().as_millis() as u64,
        entity_id = %tag.id
    );
    Ok(tag)
}

async fn create_tag_impl<R: RngCore + CryptoRng>(
    ctx: &DbContext,
    ids: &mut IdentifierGenerator<R>,
    name: &str,
) -> Result<Tag, TesseraError> {
    let name = required_text("create_tag", "name", name)?;
    let uow = ctx.unit_of_work();

    if uow
        .repository::<Tag>()
        .exists(Filter::eq("name", name.as_str()))
        .await?
    {
        return Err(TesseraError::UniquenessConflict {
            table: Tag::TABLE.to_string(),
            field: "name".to_string(),
            detail: format!("tag {:?} already exists", name),
        });
    }

    let tag = Tag::new(ids.mint::<Tag>(&uow).await?, name);
    uow.repository::<Tag>().create(&tag)?;
    uow.commit().await?.require("create_tag")?;
    Ok(tag)
}

/// Link an existing media item to an existing tag
///
/// ## Errors
///
/// - `ERR_NOT_FOUND`: the media item or the tag does not exist
/// - `ERR_UNIQUENESS_CONFLICT`: the link already exists
/// - `ERR_PERSISTENCE_FAILURE`: the insert wrote nothing
pub async fn tag_media(
    ctx: &DbContext,
    media_id: EntityId,
    tag_id: EntityId,
) -> Result<MediaTag, ExError> {
    log_op_start!(
        "tag_media",
        request_id = %ctx.request().request_id,
        entity_id = %media_id
    );
    let start = Instant::now();

    let link = tag_media_impl(ctx, media_id, tag_id)
        .await
        .map_err(|e| fail("tag_media", ctx, e, start))?;

    log_op_end!(
        "tag_media",
        duration_ms = start.elapsed().as_millis() as u64,
        entity_id = %link.id
    );
    Ok(link)
}

async fn tag_media_impl(
    ctx: &DbContext,
    media_id: EntityId,
    tag_id: EntityId,
) -> Result<MediaTag, TesseraError> {
    let mut tx = ctx.begin_transaction().await?;
    let uow = ctx.unit_of_work();
    require_existing::<MediaItem>(&uow, media_id).await?;
    require_existing::<Tag>(&uow, tag_id).await?;

    let already_linked = uow
        .repository::<MediaTag>()
        .exists(
            Filter::refers_to("media_id", media_id).and(Filter::refers_to("tag_id", tag_id)),
        )
        .await?;
    if already_linked {
        return Err(TesseraError::UniquenessConflict {
            table: MediaTag::TABLE.to_string(),
            field: "tag_id".to_string(),
            detail: format!("media {} is already tagged with {}", media_id, tag_id),
        });
    }

    let link = MediaTag::new(media_id, tag_id);
    uow.repository::<MediaTag>().create(&link)?;
    uow.commit().await?.require("tag_media")?;

    tx.complete().await?;
    Ok(link)
}
