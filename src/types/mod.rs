//! Data structures and wire types
//!
//! Wire-facing structs serialize as camelCase because the channel protocol
//! is camelCase (`mailboxId`, `namespaceName`, `fwdAddresses`, ...).

pub mod error;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use error::{MaskboxError, Result};

/// Well-known folder ids, matching the default mailbox layout.
pub mod folder {
    pub const INBOX: i64 = 1;
    pub const DRAFTS: i64 = 2;
    pub const SENT: i64 = 3;
    pub const TRASH: i64 = 4;
    /// Alias-bound incoming mail is filed here by default.
    pub const ALIAS: i64 = 5;
}

/// Canonical identifier of an alias address: `"<namespace>#<address>"`.
///
/// This is a composite key, not a surrogate id: it is the storage primary
/// key and the correlation key to upstream forwarding registration. Parsing
/// and formatting live here so the delimiter never gets concatenated ad hoc.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AliasId {
    namespace: String,
    address: String,
}

impl AliasId {
    /// Both parts must be non-empty and free of the `#`/`@` delimiters.
    pub fn new(namespace: &str, address: &str) -> Result<Self> {
        for (label, part) in [("namespace", namespace), ("address", address)] {
            if part.is_empty() {
                return Err(MaskboxError::Validation(format!("empty alias {label}")));
            }
            if part.contains('#') || part.contains('@') {
                return Err(MaskboxError::Validation(format!(
                    "alias {label} '{part}' contains a reserved delimiter"
                )));
            }
        }
        Ok(Self {
            namespace: namespace.to_string(),
            address: address.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Full deliverable address: `"<namespace>#<address>@<domain>"`.
    pub fn full_address(&self, domain: &str) -> String {
        format!("{}#{}@{}", self.namespace, self.address, domain)
    }
}

impl fmt::Display for AliasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.namespace, self.address)
    }
}

impl FromStr for AliasId {
    type Err = MaskboxError;

    fn from_str(s: &str) -> Result<Self> {
        let (namespace, address) = s
            .split_once('#')
            .ok_or_else(|| MaskboxError::Validation(format!("'{s}' is not an alias id")))?;
        AliasId::new(namespace, address)
    }
}

impl Serialize for AliasId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AliasId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Asymmetric keypair derived for a namespace, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keypair {
    pub public_key: String,
    pub private_key: String,
}

/// A registered alias namespace (subdomain-like prefix) with its
/// deterministically derived keypair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasNamespace {
    pub name: String,
    pub public_key: String,
    pub private_key: String,
    pub mailbox_id: i64,
    pub domain: String,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AliasNamespace {
    pub fn keypair(&self) -> Keypair {
        Keypair {
            public_key: self.public_key.clone(),
            private_key: self.private_key.clone(),
        }
    }
}

/// A concrete forwarding address under a namespace.
///
/// `fwd_addresses` is flattened to a comma-joined column in storage and
/// always unflattened to a vector on the way out (absent/empty => `[]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasAddress {
    pub alias_id: String,
    pub name: String,
    pub namespace_key: String,
    pub count: i64,
    pub description: String,
    pub fwd_addresses: Vec<String>,
    pub disabled: bool,
    pub whitelisted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted email message. Belongs to exactly one folder and at most
/// one alias address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub email_id: String,
    pub folder_id: i64,
    pub alias_id: Option<String>,
    pub subject: String,
    pub from_address: String,
    pub to_address: String,
    #[serde(default)]
    pub cc_address: String,
    #[serde(default)]
    pub bcc_address: String,
    #[serde(default)]
    pub body_as_text: String,
    #[serde(default)]
    pub body_as_html: String,
    /// Attachment metadata, stored opaque as JSON. File persistence is the
    /// attachment service's concern, not this core's.
    #[serde(default)]
    pub attachments: String,
    pub unread: bool,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An email as submitted to the ingestion pipeline. Everything the store
/// needs but with identity and folder assignment still optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailEnvelope {
    #[serde(default)]
    pub email_id: Option<String>,
    #[serde(default)]
    pub folder_id: Option<i64>,
    #[serde(default)]
    pub alias_id: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub cc: String,
    #[serde(default)]
    pub bcc: String,
    #[serde(default)]
    pub body_as_text: String,
    #[serde(default)]
    pub body_as_html: String,
    #[serde(default)]
    pub attachments: String,
    #[serde(default)]
    pub unread: bool,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// One entry in a bulk move: which message, and where it goes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveMessageRequest {
    pub email_id: String,
    pub folder: FolderTarget,
}

/// Target folder of a move, by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderTarget {
    pub to_id: i64,
}

/// Direction/kind of an ingestion batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestType {
    Incoming,
    Draft,
    Outgoing,
}

impl IngestType {
    /// Default folder for messages that arrive without one.
    pub fn default_folder(&self) -> i64 {
        match self {
            IngestType::Incoming => folder::INBOX,
            IngestType::Draft => folder::DRAFTS,
            IngestType::Outgoing => folder::SENT,
        }
    }
}
