use std::sync::Arc;

use tessera_core::model::{catalog_schemas, MediaItem, MediaKind, Timeline, TimelineEntry};
use tessera_core::{DbContext, Entity, EntityId, MemoryEngine};
use tessera_core_types::RequestContext;
use uuid::Uuid;

/// Fresh engine plus a context with the catalog tables declared
#[allow(dead_code)]
pub async fn memory_context() -> (MemoryEngine, DbContext) {
    let engine = MemoryEngine::new();
    let ctx = context_on(&engine);
    ctx.register_schemas(&catalog_schemas()).await.unwrap();
    (engine, ctx)
}

/// Another request-scoped context over the same engine
#[allow(dead_code)]
pub fn context_on(engine: &MemoryEngine) -> DbContext {
    DbContext::new(Arc::new(engine.session()), RequestContext::new())
}

/// Persist a timeline with `n` entries at positions 1..=n
///
/// Returns the timeline id and the entry ids in position order.
#[allow(dead_code)]
pub async fn seed_timeline(ctx: &DbContext, n: u32) -> (EntityId, Vec<EntityId>) {
    let uow = ctx.unit_of_work();
    let timeline = Timeline::new("Seeded");
    uow.repository::<Timeline>().create(&timeline).unwrap();

    let mut entry_ids = Vec::new();
    for position in 1..=n {
        let media = MediaItem::new(unique_public_id(), format!("m{}", position), MediaKind::Image);
        let entry = TimelineEntry::new(timeline.id, media.id, position);
        uow.repository::<MediaItem>().create(&media).unwrap();
        uow.repository::<TimelineEntry>().create(&entry).unwrap();
        entry_ids.push(entry.id);
    }
    uow.commit().await.unwrap().require("seed").unwrap();
    (timeline.id, entry_ids)
}

/// Public id that will not collide within a test run
#[allow(dead_code)]
pub fn unique_public_id() -> u64 {
    (Uuid::now_v7().as_u128() & 0xFFFF_FFFF_FFFF) as u64
}

/// (entry id, position) pairs of a timeline, ascending by position
#[allow(dead_code)]
pub async fn positions(ctx: &DbContext, timeline_id: EntityId) -> Vec<(EntityId, u32)> {
    let uow = ctx.unit_of_work();
    let mut entries = uow
        .repository::<TimelineEntry>()
        .find_all(Some(tessera_core::Filter::refers_to("timeline_id", timeline_id)))
        .await
        .unwrap()
        .to_vec()
        .unwrap();
    entries.sort_by_key(|e| e.position);
    entries.into_iter().map(|e| (e.id, e.position)).collect()
}

/// Number of committed rows in the table of `E`
#[allow(dead_code)]
pub fn committed<E: Entity>(engine: &MemoryEngine) -> usize {
    engine.committed_rows(E::TABLE).len()
}
