//! Tessera Core - transactional write-and-invariant layer
//!
//! This crate provides the data-access building blocks that composite write
//! handlers are made of:
//! - Specification-composable repositories over an async storage port
//! - A unit of work that reports affected rows as a typed outcome
//! - A request-scoped ambient transaction with rollback on drop
//! - Dense per-parent ordering and full-permutation reorder
//! - Collision-free public identifier minting
//!
//! An in-memory storage engine is included; the SQLite adapter lives in
//! `tessera-store`.

pub mod config;
pub mod errors;
pub mod identifier;
pub mod logging_facility;
pub mod model;
pub mod ordering;
pub mod persistence;
pub mod spec;
pub mod storage;

pub use tessera_core_types as core_types;

// Re-export commonly used types
pub use config::{CoreConfig, IdentifierConfig, LoggingConfig};
pub use errors::{ExError, ExErrorKind, Result, TesseraError};
pub use identifier::IdentifierGenerator;
pub use model::{Entity, EntityId, Ordered, PublicIdentified};
pub use persistence::{
    DbContext, FindAll, Repository, SaveOutcome, TransactionHandle, TxState, UnitOfWork,
};
pub use spec::{Filter, Loaded, OrderBy, Relation, SpecResult, Specification};
pub use storage::{MemoryEngine, MemorySession, Session};
