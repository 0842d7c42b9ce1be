//! Core domain abstractions and types
//!
//! This module contains the foundational types, traits, and error definitions
//! shared by the translator, the adapters and the loaders. It is independent
//! of any specific storage backend.

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use error::{DataError, DataResult, StorageError};
pub use traits::{compute_fn, CacheExt, CachePort, ComputeFn, FromScalar, StorePort, ValueComputer};
pub use types::{EntityKind, FieldValue, Row, Scalar, Statement};
