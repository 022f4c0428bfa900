//! Specification-composable queries
//!
//! A [`Specification`] bundles a filter, an eager-load relation tree, an
//! ordering, an optional projection and the expected cardinality for one
//! entity type.

pub mod filter;
pub mod include;
pub mod specification;

pub use filter::{compare_rows, field_value, Direction, Filter, OrderBy};
pub use include::{Loaded, LoadedRow, RelatedMap, Relation, RelationKind};
pub use specification::{Cardinality, SpecResult, Specification};
