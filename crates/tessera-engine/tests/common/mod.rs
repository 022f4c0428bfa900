use std::sync::Arc;

use tessera_core::model::{Entity, EntityId, TimelineEntry};
use tessera_core::{DbContext, Filter, IdentifierConfig, IdentifierGenerator, MemoryEngine};
use tessera_core_types::RequestContext;
use tessera_engine::open_context;

/// Fresh in-memory engine plus a request context with the catalog declared
#[allow(dead_code)]
pub async fn memory_context() -> (MemoryEngine, DbContext) {
    let engine = MemoryEngine::new();
    let ctx = context_on(&engine).await;
    (engine, ctx)
}

/// Another request over the same engine
#[allow(dead_code)]
pub async fn context_on(engine: &MemoryEngine) -> DbContext {
    open_context(Arc::new(engine.session()), RequestContext::new())
        .await
        .unwrap()
}

#[allow(dead_code)]
pub fn generator() -> IdentifierGenerator {
    IdentifierGenerator::new(IdentifierConfig::default()).unwrap()
}

/// Number of committed rows in the table of `E`
#[allow(dead_code)]
pub fn committed<E: Entity>(engine: &MemoryEngine) -> usize {
    engine.committed_rows(E::TABLE).len()
}

/// Entry ids of a timeline, ascending by position, with their positions
#[allow(dead_code)]
pub async fn entries(ctx: &DbContext, timeline_id: EntityId) -> Vec<(EntityId, u32)> {
    let uow = ctx.unit_of_work();
    let mut entries = uow
        .repository::<TimelineEntry>()
        .find_all(Some(Filter::refers_to("timeline_id", timeline_id)))
        .await
        .unwrap()
        .to_vec()
        .unwrap();
    entries.sort_by_key(|e| e.position);
    entries.into_iter().map(|e| (e.id, e.position)).collect()
}
