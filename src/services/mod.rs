//! Service layer: the operations the channel surface exposes.
//!
//! Services own the upstream-then-local ordering and the alias binding
//! rules; the sqlite adapters below them are plain row plumbing.

pub mod alias_service;
pub mod ingest;
pub mod message_service;
pub mod resolver;
