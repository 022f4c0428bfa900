use tessera_core_types::{RequestContext, RequestId, TraceId};
use thiserror::Error;

/// Result type alias using TesseraError
pub type Result<T> = std::result::Result<T, TesseraError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that handlers hand to the transport
/// layer. The codes are part of the library contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Preconditions
    NotFound,
    Validation,
    Mismatch,
    AmbiguousResult,
    UniquenessConflict,

    // Write path
    PersistenceFailure,
    Exhausted,
    TransactionState,
    InvariantViolation,

    // Integration
    Persistence,
    Serialization,
    Config,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Validation => "ERR_VALIDATION",
            ExErrorKind::Mismatch => "ERR_MISMATCH",
            ExErrorKind::AmbiguousResult => "ERR_AMBIGUOUS_RESULT",
            ExErrorKind::UniquenessConflict => "ERR_UNIQUENESS_CONFLICT",
            ExErrorKind::PersistenceFailure => "ERR_PERSISTENCE_FAILURE",
            ExErrorKind::Exhausted => "ERR_EXHAUSTED",
            ExErrorKind::TransactionState => "ERR_TRANSACTION_STATE",
            ExErrorKind::InvariantViolation => "ERR_INVARIANT_VIOLATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether an error of this kind must abort an open transaction.
    ///
    /// Everything else is detected before a write is staged.
    pub fn aborts_transaction(&self) -> bool {
        matches!(
            self,
            ExErrorKind::PersistenceFailure
                | ExErrorKind::UniquenessConflict
                | ExErrorKind::Persistence
        )
    }
}

/// Canonical structured error type
///
/// This is the failure shape handed across the handler boundary. It carries
/// classification for programmatic handling and request correlation for
/// debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    table: Option<String>,
    request_id: Option<RequestId>,
    trace_id: Option<TraceId>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            table: None,
            request_id: None,
            trace_id: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add table context
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Attach request correlation from a handler context
    pub fn with_request_context(mut self, ctx: &RequestContext) -> Self {
        self.request_id = Some(ctx.request_id.clone());
        self.trace_id = ctx.trace_id.clone();
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " (request_id: {})", request_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Error taxonomy for the write-and-invariant layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TesseraError {
    /// A referenced row (parent, sibling, target) does not exist
    #[error("{table} not found: {id}")]
    NotFound { table: String, id: String },

    /// Malformed input, e.g. an empty or foreign-id reorder list
    #[error("Validation failed in {op}: {reason}")]
    Validation { op: String, reason: String },

    /// A reorder list does not cover every child of the parent
    #[error("Reorder of parent {parent_id} expects {expected} ids, got {actual}")]
    Mismatch {
        parent_id: String,
        expected: usize,
        actual: usize,
    },

    /// A single-result query matched more than one row
    #[error("Single-result query on {table} matched {matched} rows")]
    AmbiguousResult { table: String, matched: usize },

    /// A uniqueness pre-check or a storage unique constraint failed
    #[error("Uniqueness conflict on {table}.{field}: {detail}")]
    UniquenessConflict {
        table: String,
        field: String,
        detail: String,
    },

    /// Commit reported zero (or negative) affected rows without raising
    #[error("Commit for {op} affected {affected} rows")]
    PersistenceFailure { op: String, affected: i64 },

    /// Identifier rejection sampling hit its attempt cap
    #[error("Identifier generation for {table} exhausted after {attempts} attempts")]
    Exhausted { table: String, attempts: u32 },

    /// Transaction handle used in a state that does not allow the call
    #[error("Transaction {tx_id} rejected {op}: {reason}")]
    TransactionState {
        tx_id: String,
        op: String,
        reason: String,
    },

    /// Persisted positions under a parent are not exactly {1..N}
    #[error("Ordering invariant broken on {table} under parent {parent_id}: {reason}")]
    InvariantViolation {
        table: String,
        parent_id: String,
        reason: String,
    },

    /// Storage engine failure
    #[error("Storage error ({engine}): {message}")]
    Storage { engine: String, message: String },

    /// Row (de)serialization failure
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TesseraError {
    /// Shorthand for a missing row
    pub fn not_found(table: &str, id: impl ToString) -> Self {
        TesseraError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        }
    }

    /// Shorthand for a validation failure
    pub fn validation(op: &str, reason: impl Into<String>) -> Self {
        TesseraError::Validation {
            op: op.to_string(),
            reason: reason.into(),
        }
    }

    /// Canonical kind for this error
    pub fn kind(&self) -> ExErrorKind {
        match self {
            TesseraError::NotFound { .. } => ExErrorKind::NotFound,
            TesseraError::Validation { .. } => ExErrorKind::Validation,
            TesseraError::Mismatch { .. } => ExErrorKind::Mismatch,
            TesseraError::AmbiguousResult { .. } => ExErrorKind::AmbiguousResult,
            TesseraError::UniquenessConflict { .. } => ExErrorKind::UniquenessConflict,
            TesseraError::PersistenceFailure { .. } => ExErrorKind::PersistenceFailure,
            TesseraError::Exhausted { .. } => ExErrorKind::Exhausted,
            TesseraError::TransactionState { .. } => ExErrorKind::TransactionState,
            TesseraError::InvariantViolation { .. } => ExErrorKind::InvariantViolation,
            TesseraError::Storage { .. } => ExErrorKind::Persistence,
            TesseraError::Serialization { .. } => ExErrorKind::Serialization,
            TesseraError::Config { .. } => ExErrorKind::Config,
            TesseraError::Internal { .. } => ExErrorKind::Internal,
        }
    }
}

/// Conversion from TesseraError to ExError
///
/// Handlers return `ExError`; everything below them speaks `TesseraError`.
impl From<TesseraError> for ExError {
    fn from(err: TesseraError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        let base = ExError::new(kind).with_message(message);
        match err {
            TesseraError::NotFound { table, id } => base.with_table(table).with_entity_id(id),
            TesseraError::Mismatch { parent_id, .. } => base.with_entity_id(parent_id),
            TesseraError::AmbiguousResult { table, .. }
            | TesseraError::UniquenessConflict { table, .. }
            | TesseraError::Exhausted { table, .. } => base.with_table(table),
            TesseraError::InvariantViolation {
                table, parent_id, ..
            } => base.with_table(table).with_entity_id(parent_id),
            TesseraError::Validation { op, .. } | TesseraError::PersistenceFailure { op, .. } => {
                base.with_op(op)
            }
            TesseraError::TransactionState { tx_id, op, .. } => {
                base.with_op(op).with_entity_id(tx_id)
            }
            TesseraError::Storage { .. }
            | TesseraError::Serialization { .. }
            | TesseraError::Config { .. }
            | TesseraError::Internal { .. } => base,
        }
    }
}

/// Conversion from serde_json::Error to TesseraError
impl From<serde_json::Error> for TesseraError {
    fn from(err: serde_json::Error) -> Self {
        TesseraError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        let cases = [
            (ExErrorKind::NotFound, "ERR_NOT_FOUND"),
            (ExErrorKind::Mismatch, "ERR_MISMATCH"),
            (ExErrorKind::AmbiguousResult, "ERR_AMBIGUOUS_RESULT"),
            (ExErrorKind::UniquenessConflict, "ERR_UNIQUENESS_CONFLICT"),
            (ExErrorKind::PersistenceFailure, "ERR_PERSISTENCE_FAILURE"),
            (ExErrorKind::Exhausted, "ERR_EXHAUSTED"),
        ];
        for (kind, expected_code) in cases {
            assert_eq!(kind.code(), expected_code, "Wrong code for {:?}", kind);
        }
    }

    #[test]
    fn test_only_write_failures_abort_transactions() {
        assert!(ExErrorKind::PersistenceFailure.aborts_transaction());
        assert!(ExErrorKind::UniquenessConflict.aborts_transaction());
        assert!(!ExErrorKind::Validation.aborts_transaction());
        assert!(!ExErrorKind::Mismatch.aborts_transaction());
    }

    #[test]
    fn test_not_found_carries_table_and_id() {
        let ex: ExError = TesseraError::not_found("timelines", "t-1").into();
        assert_eq!(ex.kind(), ExErrorKind::NotFound);
        assert_eq!(ex.table(), Some("timelines"));
        assert_eq!(ex.entity_id(), Some("t-1"));
    }

    #[test]
    fn test_display_includes_code_and_op() {
        let ex: ExError = TesseraError::PersistenceFailure {
            op: "reorder".to_string(),
            affected: 0,
        }
        .into();
        let rendered = ex.to_string();
        assert!(rendered.starts_with("[ERR_PERSISTENCE_FAILURE]"));
        assert!(rendered.contains("reorder"));
    }
}
