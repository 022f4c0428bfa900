//! Error handling for tessera-store
//!
//! Maps SQLite failures onto the core `TesseraError` taxonomy.

use rusqlite::ErrorCode;
use tessera_core::errors::TesseraError;

pub use tessera_core::errors::Result;

pub(crate) const ENGINE: &str = "sqlite";

/// Prefix of every unique expression index created for a declared field
pub(crate) const UNIQUE_INDEX_PREFIX: &str = "uq__";

/// Name of the unique index guarding `table.field`
pub(crate) fn unique_index_name(table: &str, field: &str) -> String {
    format!("{}{}__{}", UNIQUE_INDEX_PREFIX, table, field)
}

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> TesseraError {
    TesseraError::Storage {
        engine: ENGINE.to_string(),
        message: format!("Migration {} failed: {}", migration_id, reason),
    }
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> TesseraError {
    TesseraError::Storage {
        engine: ENGINE.to_string(),
        message: format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ),
    }
}

/// Create a database error from rusqlite::Error
///
/// Unique constraint failures become `UniquenessConflict`, naming the
/// declared field when the failing index is one of ours.
pub fn from_rusqlite(err: rusqlite::Error) -> TesseraError {
    if let rusqlite::Error::SqliteFailure(code, message) = &err {
        if code.code == ErrorCode::ConstraintViolation {
            let message = message.clone().unwrap_or_default();
            if message.starts_with("UNIQUE constraint failed") {
                return uniqueness_conflict(&message);
            }
        }
    }
    TesseraError::Storage {
        engine: ENGINE.to_string(),
        message: err.to_string(),
    }
}

fn uniqueness_conflict(message: &str) -> TesseraError {
    // "UNIQUE constraint failed: index 'uq__tags__name'"
    let declared = message
        .split('\'')
        .nth(1)
        .and_then(|index| index.strip_prefix(UNIQUE_INDEX_PREFIX))
        .and_then(|rest| rest.split_once("__"));

    let (table, field) = match declared {
        Some((table, field)) => (table.to_string(), field.to_string()),
        // "UNIQUE constraint failed: records.table_name, records.id"
        None => ("records".to_string(), "id".to_string()),
    };
    TesseraError::UniquenessConflict {
        table,
        field,
        detail: message.to_string(),
    }
}

/// Create a validation error for an unusable table or field name
pub fn invalid_name(kind: &str, name: &str) -> TesseraError {
    TesseraError::validation(
        "sqlite_identifier",
        format!("{} name {:?} may only contain [A-Za-z0-9_.]", kind, name),
    )
}

/// Create an error for a blocking task that panicked or was cancelled
pub fn join_error(err: tokio::task::JoinError) -> TesseraError {
    TesseraError::Internal {
        message: format!("sqlite worker failed: {}", err),
    }
}

/// Create an error for a poisoned connection lock
pub fn poisoned() -> TesseraError {
    TesseraError::Storage {
        engine: ENGINE.to_string(),
        message: "connection lock poisoned".to_string(),
    }
}
