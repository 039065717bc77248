//! Unified error types for the engine
//!
//! Every public operation reports failures through these variants; the
//! channel layer turns them into structured `{name, message, stacktrace}`
//! records instead of letting raw errors escape to callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine error type for services and channel handlers
///
/// All errors are serializable so they can cross the response channel.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum MaskboxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Key derivation failed: {0}")]
    CryptoDerivation(String),

    /// The mail relay rejected or timed out; no local state was changed.
    #[error("Upstream registration failed: {0}")]
    UpstreamRegistration(String),

    /// Upstream succeeded but the local write failed. Local state is stale
    /// until the caller retries the local half of the operation.
    #[error("Partial update: {0}")]
    PartialUpdate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("{0}")]
    Other(String),
}

impl MaskboxError {
    /// Wire-level error name used by the channel's error record.
    pub fn name(&self) -> &'static str {
        match self {
            MaskboxError::Config(_) => "ConfigError",
            MaskboxError::Validation(_) => "ValidationError",
            MaskboxError::NotFound(_) => "NotFoundError",
            MaskboxError::CryptoDerivation(_) => "CryptoDerivationError",
            MaskboxError::UpstreamRegistration(_) => "UpstreamRegistrationError",
            MaskboxError::PartialUpdate(_) => "PartialUpdateError",
            MaskboxError::Database(_) => "DatabaseError",
            MaskboxError::Parse(_) => "ParseError",
            MaskboxError::Io(_) => "IoError",
            MaskboxError::Channel(_) => "ChannelError",
            MaskboxError::Other(_) => "Error",
        }
    }
}

// Implement From for common error types

impl From<std::io::Error> for MaskboxError {
    fn from(err: std::io::Error) -> Self {
        MaskboxError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for MaskboxError {
    fn from(err: toml::de::Error) -> Self {
        MaskboxError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MaskboxError {
    fn from(err: serde_json::Error) -> Self {
        MaskboxError::Parse(err.to_string())
    }
}

impl From<rusqlite::Error> for MaskboxError {
    fn from(err: rusqlite::Error) -> Self {
        MaskboxError::Database(err.to_string())
    }
}

impl From<r2d2::Error> for MaskboxError {
    fn from(err: r2d2::Error) -> Self {
        MaskboxError::Database(err.to_string())
    }
}

impl From<String> for MaskboxError {
    fn from(err: String) -> Self {
        MaskboxError::Other(err)
    }
}

impl From<&str> for MaskboxError {
    fn from(err: &str) -> Self {
        MaskboxError::Other(err.to_string())
    }
}

/// Result type alias using MaskboxError
pub type Result<T> = std::result::Result<T, MaskboxError>;
