//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names identical across the core, the storage
//! adapters and the write handlers.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_TRACE_ID: &str = "trace_id";
pub const FIELD_TX_ID: &str = "tx_id";

// Persistence identifiers
pub const FIELD_TABLE: &str = "table";
pub const FIELD_ENTITY_ID: &str = "entity_id";
pub const FIELD_PARENT_ID: &str = "parent_id";
pub const FIELD_POSITION: &str = "position";

// Counters
pub const FIELD_AFFECTED_ROWS: &str = "affected_rows";
pub const FIELD_STAGED: &str = "staged";
pub const FIELD_ATTEMPTS: &str = "attempts";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

// Transaction lifecycle events
pub const EVENT_TX_BEGIN: &str = "tx_begin";
pub const EVENT_TX_COMPLETE: &str = "tx_complete";
pub const EVENT_TX_ROLLBACK: &str = "tx_rollback";
