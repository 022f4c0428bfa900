//! Migration checksums
//!
//! A recorded checksum pins the SQL a database was migrated with; editing an
//! applied migration in place is reported instead of silently skipped.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of the migration text
pub fn compute_checksum(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.as_bytes()))
}

/// True when no checksum was recorded or it matches `sql`
pub fn matches_recorded(sql: &str, recorded: Option<&str>) -> bool {
    recorded.map_or(true, |checksum| checksum == compute_checksum(sql))
}
