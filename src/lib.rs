//! Maskbox - disposable alias namespaces and email ingestion
//!
//! The engine lets a mailbox owner register alias namespaces
//! (`<namespace>@<domain>`), hand out disposable addresses
//! (`<namespace>#<address>@<domain>`) and ingest mail routed through
//! them, creating never-seen addresses on the fly.
//!
//! ## Module Organization
//!
//! - `channel/`: Request/response event surface (thin wrappers)
//! - `services/`: Business logic (channel-agnostic)
//! - `adapters/`: SQLite storage with FTS search
//! - `relay/`: Upstream mail-relay registration API
//! - `crypto/`: Deterministic namespace keypair derivation
//! - `state/`: Shared engine state and keypair cache
//! - `types/`: Data structures and errors
//! - `config/`: Configuration management

pub mod adapters;
pub mod channel;
pub mod config;
pub mod crypto;
pub mod relay;
pub mod services;
pub mod state;
pub mod types;
