//! Feels Data Access Library
//!
//! Translates ORM-shaped query descriptors into parameterized PostgreSQL,
//! resolves one level of foreign-key relations, and batches point lookups
//! per request through a Redis-backed, computation-fallback loader.

pub mod adapter;
pub mod adapters;
pub mod config;
pub mod core;
pub mod infrastructure;
pub mod loader;
pub mod naming;
pub mod pricing;
pub mod query;
pub mod relations;
pub mod schema;

// Re-export commonly used types
pub use adapter::{EntityAdapter, Page, Repository};
pub use config::DataConfig;
pub use core::{DataError, DataResult, EntityKind, FieldValue, Row, Scalar, Statement};
pub use loader::{BatchFn, BatchedLoader, CachedLoader, Resolved, TieredResolver};
pub use naming::{CaseTranslator, NamingRules};
pub use query::{OrderBy, Predicate, QueryDescriptor, SortDirection};
pub use relations::ResolutionMode;
pub use schema::{EntitySchema, MatchingRules, RelationDef, Schema};
