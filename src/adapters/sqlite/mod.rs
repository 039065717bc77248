//! SQLite-backed document store
//!
//! The storage collaborator: find/insert/update/remove plus an atomic
//! counter increment and FTS-backed search. Split per collection, all
//! functions taking a pooled connection handle.

pub mod aliases;
pub mod messages;
pub mod namespaces;
pub mod pool;
pub mod schema;

pub use pool::{create_pool, in_memory_pool, DbConnection, DbPool};
