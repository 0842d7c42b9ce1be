//! Per-request batched loaders

pub mod batch;
pub mod tiered;

pub use batch::{BatchFn, BatchedLoader};
pub use tiered::{CachedLoader, LatestValueSource, Resolved, TieredResolver, WriteBack};
