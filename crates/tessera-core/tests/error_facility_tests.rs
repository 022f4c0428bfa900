use tessera_core::errors::{ExError, ExErrorKind, TesseraError};
use tessera_core_types::{RequestContext, TraceId};

#[test]
fn test_not_found_verifiable_by_kind() {
    let err = TesseraError::not_found("media_items", "m-unknown");

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::NotFound);
    assert_eq!(ex_err.code(), "ERR_NOT_FOUND");
    assert_eq!(ex_err.table(), Some("media_items"));
    assert_eq!(ex_err.entity_id(), Some("m-unknown"));
}

#[test]
fn test_mismatch_carries_parent_and_counts() {
    let err = TesseraError::Mismatch {
        parent_id: "t1".to_string(),
        expected: 4,
        actual: 3,
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.code(), "ERR_MISMATCH");
    assert_eq!(ex_err.entity_id(), Some("t1"));
    assert!(ex_err.message().contains("expects 4"));
}

#[test]
fn test_persistence_failure_carries_op() {
    let err = TesseraError::PersistenceFailure {
        op: "attach_media".to_string(),
        affected: 0,
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::PersistenceFailure);
    assert_eq!(ex_err.op(), Some("attach_media"));
}

#[test]
fn test_storage_maps_to_persistence_kind() {
    let err = TesseraError::Storage {
        engine: "sqlite".to_string(),
        message: "disk I/O error".to_string(),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::Persistence);
    assert_eq!(ex_err.code(), "ERR_PERSISTENCE");
}

#[test]
fn test_error_kind_code_mapping() {
    // Each kind has a stable, unique code
    let kinds = vec![
        (ExErrorKind::NotFound, "ERR_NOT_FOUND"),
        (ExErrorKind::Validation, "ERR_VALIDATION"),
        (ExErrorKind::Mismatch, "ERR_MISMATCH"),
        (ExErrorKind::AmbiguousResult, "ERR_AMBIGUOUS_RESULT"),
        (ExErrorKind::UniquenessConflict, "ERR_UNIQUENESS_CONFLICT"),
        (ExErrorKind::PersistenceFailure, "ERR_PERSISTENCE_FAILURE"),
        (ExErrorKind::Exhausted, "ERR_EXHAUSTED"),
        (ExErrorKind::TransactionState, "ERR_TRANSACTION_STATE"),
        (ExErrorKind::InvariantViolation, "ERR_INVARIANT_VIOLATION"),
    ];

    let mut seen = std::collections::HashSet::new();
    for (kind, expected_code) in kinds {
        assert_eq!(kind.code(), expected_code);
        assert!(seen.insert(expected_code));
    }
}

#[test]
fn test_ex_error_builder_pattern() {
    let ctx = RequestContext::new().with_trace_id(TraceId::new());
    let ex_err = ExError::new(ExErrorKind::Validation)
        .with_op("reorder")
        .with_entity_id("t1")
        .with_message("ordered id list is empty")
        .with_request_context(&ctx);

    assert_eq!(ex_err.op(), Some("reorder"));
    assert_eq!(ex_err.request_id(), Some(&ctx.request_id));
    assert_eq!(ex_err.trace_id(), ctx.trace_id.as_ref());
    assert!(ex_err.message().contains("empty"));
}

#[test]
fn test_ex_error_display() {
    let ex_err = ExError::new(ExErrorKind::NotFound)
        .with_op("attach_media")
        .with_table("timelines")
        .with_message("timelines not found: t9");

    let display = ex_err.to_string();

    assert!(display.contains("[ERR_NOT_FOUND]"));
    assert!(display.contains("attach_media"));
    assert!(display.contains("(table: timelines)"));
}
