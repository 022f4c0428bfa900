//! Engine-level write commands.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tessera_core::errors::ExError;
use tessera_core::model::{EntityId, MediaTag, Tag, Timeline};
use tessera_core::{DbContext, IdentifierGenerator};

use crate::commands::tags::{create_tag, tag_media};
use crate::commands::timeline::{
    attach_media, attach_media_batch, create_timeline, detach_media, reorder_timeline,
    AttachedMedia, NewMedia,
};

/// Composite writes a transport layer can dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineCommand {
    CreateTimeline {
        title: String,
    },
    AttachMedia {
        timeline_id: EntityId,
        media: NewMedia,
    },
    AttachMediaBatch {
        timeline_id: EntityId,
        media: Vec<NewMedia>,
    },
    /// Full permutation of the timeline's entry ids
    ReorderTimeline {
        timeline_id: EntityId,
        ordered_entry_ids: Vec<EntityId>,
    },
    DetachMedia {
        timeline_id: EntityId,
        entry_id: EntityId,
    },
    CreateTag {
        name: String,
    },
    TagMedia {
        media_id: EntityId,
        tag_id: EntityId,
    },
}

/// Result of applying an engine command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineCommandResult {
    TimelineCreated(Timeline),
    MediaAttached(AttachedMedia),
    MediaBatchAttached(Vec<AttachedMedia>),
    TimelineReordered { affected_rows: u64 },
    MediaDetached { affected_rows: u64 },
    TagCreated(Tag),
    MediaTagged(MediaTag),
}

/// Apply one command against a request context
///
/// # Errors
///
/// Returns the handler's `ExError`; see the individual handlers.
pub async fn apply_engine_command<R: RngCore + CryptoRng>(
    cmd: EngineCommand,
    ctx: &DbContext,
    ids: &mut IdentifierGenerator<R>,
) -> Result<EngineCommandResult, ExError> {
    match cmd {
        EngineCommand::CreateTimeline { title } => create_timeline(ctx, &title)
            .await
            .map(EngineCommandResult::TimelineCreated),
        EngineCommand::AttachMedia { timeline_id, media } => {
            attach_media(ctx, ids, timeline_id, media)
                .await
                .map(EngineCommandResult::MediaAttached)
        }
        EngineCommand::AttachMediaBatch { timeline_id, media } => {
            attach_media_batch(ctx, ids, timeline_id, media)
                .await
                .map(EngineCommandResult::MediaBatchAttached)
        }
        EngineCommand::ReorderTimeline {
            timeline_id,
            ordered_entry_ids,
        } => reorder_timeline(ctx, timeline_id, &ordered_entry_ids)
            .await
            .map(|affected_rows| EngineCommandResult::TimelineReordered { affected_rows }),
        EngineCommand::DetachMedia {
            timeline_id,
            entry_id,
        } => detach_media(ctx, timeline_id, entry_id)
            .await
            .map(|affected_rows| EngineCommandResult::MediaDetached { affected_rows }),
        EngineCommand::CreateTag { name } => create_tag(ctx, ids, &name)
            .await
            .map(EngineCommandResult::TagCreated),
        EngineCommand::TagMedia { media_id, tag_id } => tag_media(ctx, media_id, tag_id)
            .await
            .map(EngineCommandResult::MediaTagged),
    }
}
