//! Repositories, unit of work and the ambient transaction

pub mod context;
pub mod repository;
pub mod transaction;
pub mod unit_of_work;

pub use context::DbContext;
pub use repository::{FindAll, Repository};
pub use transaction::{TransactionHandle, TxState};
pub use unit_of_work::{SaveOutcome, UnitOfWork};
