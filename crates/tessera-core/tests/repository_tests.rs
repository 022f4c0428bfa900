//! Repository and Specification Tests
//!
//! ## Scenarios Covered
//!
//! 1. Writes are staged until commit; affected-row semantics
//! 2. Snapshot reads are lazy and restartable
//! 3. Single-result reads never pick a row silently
//! 4. Specifications with nested eager-load trees
//! 5. Projections

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use serde_json::json;
use tessera_core::model::{MediaItem, MediaKind, MediaTag, Tag, Timeline, TimelineEntry};
use tessera_core::{
    ExErrorKind, Filter, OrderBy, Relation, SaveOutcome, SpecResult, Specification, TesseraError,
};

use common::{committed, memory_context, seed_timeline, unique_public_id};

#[tokio::test]
async fn test_create_is_staged_until_commit() {
    // GIVEN a staged timeline
    let (engine, ctx) = memory_context().await;
    let uow = ctx.unit_of_work();
    uow.repository::<Timeline>()
        .create(&Timeline::new("Staged"))
        .unwrap();

    // THEN nothing reaches storage before commit
    assert_eq!(uow.pending(), 1);
    assert_eq!(committed::<Timeline>(&engine), 0);

    // WHEN committed
    let outcome = uow.commit().await.unwrap();

    // THEN exactly one row was written and the change set is empty
    assert_eq!(outcome, SaveOutcome::Persisted(1));
    assert_eq!(uow.pending(), 0);
    assert_eq!(committed::<Timeline>(&engine), 1);
}

#[tokio::test]
async fn test_commit_with_nothing_staged_is_nothing_written() {
    let (_engine, ctx) = memory_context().await;
    let outcome = ctx.unit_of_work().commit().await.unwrap();
    assert_eq!(outcome, SaveOutcome::NothingWritten);
}

#[tokio::test]
async fn test_update_of_missing_row_requires_fails() {
    let (_engine, ctx) = memory_context().await;
    let uow = ctx.unit_of_work();
    uow.repository::<Timeline>()
        .update(&Timeline::new("Nobody"))
        .unwrap();

    let err = uow
        .commit()
        .await
        .unwrap()
        .require("rename_timeline")
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::PersistenceFailure);
}

#[tokio::test]
async fn test_update_and_delete_range_count_existing_rows() {
    // GIVEN two committed timelines
    let (engine, ctx) = memory_context().await;
    let uow = ctx.unit_of_work();
    let mut a = Timeline::new("A");
    let b = Timeline::new("B");
    uow.repository::<Timeline>().create_range([&a, &b]).unwrap();
    uow.commit().await.unwrap().require("setup").unwrap();

    // WHEN one is renamed and both are deleted in a later batch
    a.title = "A2".to_string();
    let repo = uow.repository::<Timeline>();
    repo.update(&a).unwrap();
    uow.commit().await.unwrap().require("rename").unwrap();
    repo.delete_range([&a, &b]);
    let outcome = uow.commit().await.unwrap();

    // THEN each existing row counts once
    assert_eq!(outcome.affected(), 2);
    assert_eq!(committed::<Timeline>(&engine), 0);
}

#[tokio::test]
async fn test_unique_violation_fails_whole_batch() {
    // GIVEN a batch with a valid tag and a duplicate name
    let (engine, ctx) = memory_context().await;
    let uow = ctx.unit_of_work();
    let repo = uow.repository::<Tag>();
    repo.create(&Tag::new(unique_public_id(), "sunset")).unwrap();
    repo.create(&Tag::new(unique_public_id(), "beach")).unwrap();
    repo.create(&Tag::new(unique_public_id(), "sunset")).unwrap();

    // WHEN committed
    let err = uow.commit().await.unwrap_err();

    // THEN nothing from the batch is written and the change set is cleared
    assert!(matches!(err, TesseraError::UniquenessConflict { ref field, .. } if field == "name"));
    assert_eq!(committed::<Tag>(&engine), 0);
    assert_eq!(uow.pending(), 0);
}

#[tokio::test]
async fn test_discard_drops_staged_changes() {
    let (engine, ctx) = memory_context().await;
    let uow = ctx.unit_of_work();
    uow.repository::<Timeline>()
        .create(&Timeline::new("Dropped"))
        .unwrap();

    assert_eq!(uow.discard(), 1);
    assert_eq!(uow.commit().await.unwrap(), SaveOutcome::NothingWritten);
    assert_eq!(committed::<Timeline>(&engine), 0);
}

#[tokio::test]
async fn test_find_all_is_a_restartable_snapshot() {
    // GIVEN three committed entries
    let (_engine, ctx) = memory_context().await;
    let (timeline_id, _) = seed_timeline(&ctx, 3).await;
    let uow = ctx.unit_of_work();
    let all = uow
        .repository::<TimelineEntry>()
        .find_all(Some(Filter::refers_to("timeline_id", timeline_id)))
        .await
        .unwrap();

    // WHEN more rows are written after the read
    seed_timeline(&ctx, 2).await;

    // THEN the sequence still holds the snapshot and iterates repeatedly
    assert_eq!(all.len(), 3);
    assert_eq!(all.iter().count(), 3);
    assert_eq!(all.iter().filter_map(Result::ok).count(), 3);
    assert_eq!(all.clone().to_vec().unwrap().len(), 3);
}

#[tokio::test]
async fn test_get_single_or_default_rejects_two_matches() {
    // GIVEN two entries on one timeline
    let (_engine, ctx) = memory_context().await;
    let (timeline_id, _) = seed_timeline(&ctx, 2).await;
    let uow = ctx.unit_of_work();

    // WHEN asking for the single entry of that timeline
    let err = uow
        .repository::<TimelineEntry>()
        .get_single_or_default(Some(Filter::refers_to("timeline_id", timeline_id)), &[])
        .await
        .unwrap_err();

    // THEN the ambiguity is reported, not resolved
    assert_eq!(
        err,
        TesseraError::AmbiguousResult {
            table: "timeline_entries".to_string(),
            matched: 2
        }
    );
}

#[tokio::test]
async fn test_get_first_or_default_returns_none_when_empty() {
    let (_engine, ctx) = memory_context().await;
    let uow = ctx.unit_of_work();
    let found = uow
        .repository::<Timeline>()
        .get_first_or_default(Some(Filter::eq("title", "absent")), &[])
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_exists_count_and_get_by_id() {
    let (_engine, ctx) = memory_context().await;
    let (timeline_id, ids) = seed_timeline(&ctx, 3).await;
    let uow = ctx.unit_of_work();
    let repo = uow.repository::<TimelineEntry>();

    assert_eq!(repo.count(None).await.unwrap(), 3);
    assert!(repo.exists(Filter::eq("position", 3)).await.unwrap());
    assert!(!repo.exists(Filter::gt("position", 3)).await.unwrap());
    let entry = repo.get_by_id(ids[1]).await.unwrap().unwrap();
    assert_eq!(entry.timeline_id, timeline_id);
    assert_eq!(entry.position, 2);
}

#[tokio::test]
async fn test_specification_resolves_nested_includes() {
    // GIVEN a timeline with two entries, the second media tagged "sea"
    let (_engine, ctx) = memory_context().await;
    let (timeline_id, ids) = seed_timeline(&ctx, 2).await;
    let uow = ctx.unit_of_work();
    let second = uow
        .repository::<TimelineEntry>()
        .get_by_id(ids[1])
        .await
        .unwrap()
        .unwrap();
    let tag = Tag::new(unique_public_id(), "sea");
    uow.repository::<Tag>().create(&tag).unwrap();
    uow.repository::<MediaTag>()
        .create(&MediaTag::new(second.media_id, tag.id))
        .unwrap();
    uow.commit().await.unwrap().require("tag").unwrap();

    // WHEN running a single-timeline spec with entries -> media -> tags
    let spec = Specification::<Timeline>::single()
        .filter(Filter::id_eq(timeline_id))
        .include(
            Relation::to_many::<TimelineEntry>("entries", "timeline_id")
                .ordered_by(OrderBy::desc("position"))
                .then_include(
                    Relation::to_one::<MediaItem>("media", "media_id")
                        .then_include(Relation::to_many::<MediaTag>("tags", "media_id")),
                ),
        );
    let result = uow
        .repository::<Timeline>()
        .run_specification(&spec)
        .await
        .unwrap();

    // THEN the whole tree is loaded in the requested order
    let timeline = match result {
        SpecResult::Single(Some(loaded)) => loaded,
        other => panic!("expected one timeline, got {:?}", other),
    };
    assert_eq!(timeline.id, timeline_id);
    let entries = timeline.related_as::<TimelineEntry>("entries").unwrap();
    assert_eq!(
        entries.iter().map(|e| e.position).collect::<Vec<_>>(),
        vec![2, 1]
    );
    let first_loaded = &timeline.related("entries")[0];
    let media = first_loaded.related("media");
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].related("tags").len(), 1);
    assert!(timeline.related("entries")[1].related("media")[0]
        .related("tags")
        .is_empty());
}

#[tokio::test]
async fn test_single_specification_matching_two_rows_is_ambiguous() {
    let (_engine, ctx) = memory_context().await;
    seed_timeline(&ctx, 2).await;
    let uow = ctx.unit_of_work();

    let spec = Specification::<TimelineEntry>::single().filter(Filter::le("position", 2));
    let err = uow
        .repository::<TimelineEntry>()
        .run_specification(&spec)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::AmbiguousResult);
}

#[tokio::test]
async fn test_many_specification_is_reusable_and_ordered() {
    let (_engine, ctx) = memory_context().await;
    let (timeline_id, _) = seed_timeline(&ctx, 3).await;
    let uow = ctx.unit_of_work();
    let repo = uow.repository::<TimelineEntry>();

    let spec = Specification::<TimelineEntry>::many()
        .filter(Filter::refers_to("timeline_id", timeline_id))
        .order_by(OrderBy::desc("position"));
    let first = repo.run_specification(&spec).await.unwrap();
    let second = repo.run_specification(&spec).await.unwrap();

    assert_eq!(first, second);
    let positions: Vec<u32> = first.into_vec().iter().map(|e| e.position).collect();
    assert_eq!(positions, vec![3, 2, 1]);
}

#[tokio::test]
async fn test_run_projection_returns_selected_fields() {
    let (_engine, ctx) = memory_context().await;
    let uow = ctx.unit_of_work();
    uow.repository::<MediaItem>()
        .create(&MediaItem::new(77, "Dunes", MediaKind::Image))
        .unwrap();
    uow.commit().await.unwrap().require("setup").unwrap();

    let spec = Specification::<MediaItem>::many()
        .filter(Filter::eq("kind", "image"))
        .project(["title", "public_id"]);
    let rows = uow
        .repository::<MediaItem>()
        .run_projection(&spec)
        .await
        .unwrap();

    assert_eq!(rows, vec![json!({"title": "Dunes", "public_id": 77})]);
}
