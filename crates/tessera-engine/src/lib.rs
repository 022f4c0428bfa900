//! Tessera Engine - composite write handlers
//!
//! Handlers coordinate the core's repositories, ordering and identifier
//! algorithms inside one ambient transaction per request, and hand failures
//! back as structured `ExError`s carrying the request's correlation ids.

pub mod bootstrap;
pub mod commands;

pub use bootstrap::{open_context, sqlite_context};
pub use commands::engine_command::{apply_engine_command, EngineCommand, EngineCommandResult};
