//! Deterministic namespace keypair derivation
//!
//! A namespace's keypair is a pure function of the account root secret, the
//! namespace name, and the mail domain. Re-deriving on any device holding
//! the account secret reproduces the same pair, so private keys never need
//! to be transmitted between devices.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};

use crate::types::error::{MaskboxError, Result};
use crate::types::Keypair;

/// Max length of a DNS label, which namespaces must fit in.
const MAX_NAMESPACE_LEN: usize = 63;

/// Check that a namespace is usable as a DNS-label-safe subdomain:
/// non-empty, at most 63 bytes, lowercase alphanumerics and hyphens,
/// no leading or trailing hyphen.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(MaskboxError::Validation("namespace must not be empty".into()));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(MaskboxError::Validation(format!(
            "namespace '{namespace}' exceeds {MAX_NAMESPACE_LEN} bytes"
        )));
    }
    if namespace.starts_with('-') || namespace.ends_with('-') {
        return Err(MaskboxError::Validation(format!(
            "namespace '{namespace}' must not start or end with a hyphen"
        )));
    }
    if !namespace
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(MaskboxError::Validation(format!(
            "namespace '{namespace}' must be lowercase alphanumerics and hyphens"
        )));
    }
    Ok(())
}

/// Derive the keypair for a namespace from the account root secret.
///
/// The seed string mirrors the registration identity:
/// `"<secret><namespace>@<domain>"`, reduced to 32 bytes with SHA-256 and
/// expanded into an Ed25519 keypair. Deterministic by construction.
pub fn derive_namespace_keypair(secret: &str, namespace: &str, domain: &str) -> Result<Keypair> {
    validate_namespace(namespace)?;

    if secret.is_empty() {
        return Err(MaskboxError::CryptoDerivation(
            "account secret is empty".to_string(),
        ));
    }
    if domain.is_empty() {
        return Err(MaskboxError::CryptoDerivation(
            "mail domain is empty".to_string(),
        ));
    }

    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(namespace.as_bytes());
    hasher.update(b"@");
    hasher.update(domain.as_bytes());
    let seed: [u8; 32] = hasher.finalize().into();

    let signing_key = SigningKey::from_bytes(&seed);
    let verifying_key = signing_key.verifying_key();

    Ok(Keypair {
        public_key: BASE64.encode(verifying_key.to_bytes()),
        private_key: BASE64.encode(signing_key.to_bytes()),
    })
}
