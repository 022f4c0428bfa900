//! Engine Command Dispatch Tests
//!
//! ## Scenarios Covered
//!
//! 1. Commands dispatch to their handlers
//! 2. Every handler logs start and exactly one of end / end_error
//! 3. Commands are plain serde data

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use tessera_core::logging_facility::test_capture::init_test_capture;
use tessera_core::model::MediaKind;
use tessera_core::ExErrorKind;
use tessera_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};
use tessera_engine::commands::timeline::NewMedia;
use tessera_engine::{apply_engine_command, EngineCommand, EngineCommandResult};
use uuid::Uuid;

use common::{entries, generator, memory_context};

#[tokio::test]
async fn test_dispatch_runs_a_full_timeline_flow() {
    // GIVEN a fresh request context
    let (_engine, ctx) = memory_context().await;
    let mut ids = generator();

    // WHEN a timeline is created, filled and reordered through commands
    let timeline = match apply_engine_command(
        EngineCommand::CreateTimeline {
            title: "Dispatch".to_string(),
        },
        &ctx,
        &mut ids,
    )
    .await
    .unwrap()
    {
        EngineCommandResult::TimelineCreated(timeline) => timeline,
        other => panic!("unexpected result {:?}", other),
    };
    let attached = match apply_engine_command(
        EngineCommand::AttachMediaBatch {
            timeline_id: timeline.id,
            media: vec![
                NewMedia::new("a", MediaKind::Image),
                NewMedia::new("b", MediaKind::Audio),
            ],
        },
        &ctx,
        &mut ids,
    )
    .await
    .unwrap()
    {
        EngineCommandResult::MediaBatchAttached(attached) => attached,
        other => panic!("unexpected result {:?}", other),
    };
    let reordered = apply_engine_command(
        EngineCommand::ReorderTimeline {
            timeline_id: timeline.id,
            ordered_entry_ids: vec![attached[1].entry.id, attached[0].entry.id],
        },
        &ctx,
        &mut ids,
    )
    .await
    .unwrap();

    // THEN the order is the requested one
    assert_eq!(
        reordered,
        EngineCommandResult::TimelineReordered { affected_rows: 2 }
    );
    assert_eq!(
        entries(&ctx, timeline.id).await,
        vec![(attached[1].entry.id, 1), (attached[0].entry.id, 2)]
    );
}

#[tokio::test]
async fn test_handlers_log_lifecycle_events() {
    let capture = init_test_capture();
    let (_engine, ctx) = memory_context().await;
    let mut ids = generator();

    // GIVEN one successful and one failing command on this request
    apply_engine_command(
        EngineCommand::CreateTag {
            name: format!("tag-{}", Uuid::now_v7()),
        },
        &ctx,
        &mut ids,
    )
    .await
    .unwrap();
    let err = apply_engine_command(
        EngineCommand::DetachMedia {
            timeline_id: Uuid::now_v7(),
            entry_id: Uuid::now_v7(),
        },
        &ctx,
        &mut ids,
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);

    // THEN each handler logged start and exactly one terminal event for this request
    let request_id = &ctx.request().request_id;
    assert_eq!(capture.count(request_id, "create_tag", EVENT_START), 1);
    assert_eq!(capture.count(request_id, "detach_media", EVENT_START), 1);
    assert_eq!(capture.count(request_id, "detach_media", EVENT_END_ERROR), 1);
    capture.assert_logged("create_tag", EVENT_END);

    let error_event = capture
        .for_request(request_id)
        .into_iter()
        .find(|e| e.is("detach_media", EVENT_END_ERROR))
        .unwrap();
    assert_eq!(error_event.err_code(), Some("ERR_NOT_FOUND"));
}

#[test]
fn test_commands_round_trip_through_json() {
    let cmd = EngineCommand::AttachMedia {
        timeline_id: Uuid::now_v7(),
        media: NewMedia::new("clip", MediaKind::Video),
    };

    let json = serde_json::to_value(&cmd).unwrap();

    assert_eq!(json["AttachMedia"]["media"]["kind"], "video");
    let back: EngineCommand = serde_json::from_value(json).unwrap();
    assert_eq!(back, cmd);
}
