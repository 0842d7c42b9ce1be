//! Query descriptors, the predicate AST and SQL rendering

pub mod builder;
pub mod descriptor;
pub mod predicate;

pub use builder::{escape_like, quote_ident, Cursor, ParamList, SelectQuery, StatementBuilder};
pub use descriptor::{where_map, OrderBy, QueryDescriptor, SortDirection};
pub use predicate::{scalar_from_json, CompareOp, Predicate};
