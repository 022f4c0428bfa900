#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use tessera_core::errors::{ExErrorKind, TesseraError};
use tessera_core::logging_facility::test_capture::init_test_capture;
use tessera_core::model::{Timeline, TimelineEntry};
use tessera_core::ordering::reorder;
use tessera_core::{log_op_end, log_op_error, log_op_start};
use tessera_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};

use common::{memory_context, seed_timeline};

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name);

    capture.assert_logged(op_name, EVENT_START);
}

#[test]
fn test_log_op_end_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42);

    let end_events = capture.select(|e| e.is(op_name, EVENT_END));

    assert_eq!(end_events.len(), 1, "Should have exactly one end event");
    assert_eq!(end_events[0].field("duration_ms"), Some("42"));
}

#[test]
fn test_log_op_error_includes_kind_and_code() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let err = TesseraError::not_found("timelines", "t1");
    log_op_error!(op_name, err, duration_ms = 10);

    let events = capture.select(|e| e.is(op_name, EVENT_END_ERROR));
    let error_event = events.first().expect("Should have error event");

    assert_eq!(error_event.err_code(), Some("ERR_NOT_FOUND"));
    assert_eq!(
        error_event.field("err.kind"),
        Some(format!("{:?}", ExErrorKind::NotFound).as_str())
    );
}

#[test]
fn test_log_macros_with_multiple_fields() {
    let capture = init_test_capture();
    let op_name = "test_log_macros_fields_unique_4";

    log_op_start!(op_name, parent_id = "p1", staged = 3usize);

    let events = capture.for_op(op_name);
    let start_event = events.first().expect("Should have start event");
    assert_eq!(start_event.field("parent_id"), Some("p1"));
    assert_eq!(start_event.field("staged"), Some("3"));
}

#[test]
#[should_panic(expected = "no start event logged")]
fn test_assert_logged_fails_for_unknown_op() {
    let capture = init_test_capture();

    capture.assert_logged("nonexistent_op_truly_unique_999", EVENT_START);
}

#[tokio::test]
async fn test_commit_logs_start_and_end_with_affected_rows() {
    // GIVEN test capture and a staged timeline
    let capture = init_test_capture();
    let (_engine, ctx) = memory_context().await;
    let uow = ctx.unit_of_work();
    uow.repository::<Timeline>()
        .create(&Timeline::new("Logged"))
        .unwrap();

    // WHEN committed
    uow.commit().await.unwrap().require("commit").unwrap();

    // THEN a commit end event carries the affected row count
    let ended = capture.select(|e| e.is("commit", EVENT_END) && e.affected_rows() == Some(1));
    assert!(!ended.is_empty());
}

#[tokio::test]
async fn test_failed_reorder_logs_single_error_event() {
    // GIVEN a timeline with three entries
    let capture = init_test_capture();
    let (_engine, ctx) = memory_context().await;
    let (timeline_id, ids) = seed_timeline(&ctx, 3).await;

    // WHEN a short list is submitted
    let err = reorder::<TimelineEntry>(&ctx.unit_of_work(), timeline_id, &ids[..2])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Mismatch);

    // THEN exactly one end_error event with the mismatch code was logged for it
    let parent = timeline_id.to_string();
    assert!(capture
        .error_codes("reorder")
        .iter()
        .any(|code| code == "ERR_MISMATCH"));
    let started_for_parent = capture
        .select(|e| e.is("reorder", EVENT_START) && e.field("parent_id") == Some(parent.as_str()));
    assert_eq!(started_for_parent.len(), 1);
}
