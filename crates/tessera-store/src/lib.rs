//! Tessera Store - SQLite engine for the tessera storage port
//!
//! Provides:
//! - SQLite schema with migrations framework
//! - Filter and ordering compilation to `json_extract` SQL
//! - `SqliteEngine` / `SqliteSession` implementing `tessera_core::Session`

pub mod db;
pub mod errors;
pub mod migrations;
pub mod session;
pub mod sql;

// Re-export key types
pub use errors::Result;
pub use session::{SqliteEngine, SqliteSession};
