//! Shared engine state
//!
//! The keypair cache is deliberately an explicit context object handed to
//! the resolver and registries, not ambient global state: it is populated
//! when namespaces are registered or listed and cleared on account logout.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::adapters::sqlite::DbPool;
use crate::relay::MailRelay;
use crate::types::Keypair;

/// Process-wide cache of namespace keypairs, keyed by namespace name.
///
/// The namespace registry is the source of truth; this is a non-owning
/// projection so the resolver and crypto layer can reach a namespace's
/// private key without a storage round trip. Entries are only appended or
/// overwritten, never individually removed.
#[derive(Debug, Clone, Default)]
pub struct KeypairCache {
    inner: Arc<RwLock<HashMap<String, Keypair>>>,
}

impl KeypairCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or overwrite the keypair for a namespace.
    pub fn install(&self, namespace: &str, keypair: Keypair) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(namespace.to_string(), keypair);
        }
    }

    pub fn get(&self, namespace: &str) -> Option<Keypair> {
        self.inner.read().ok()?.get(namespace).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Called on account logout.
    pub fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}

/// The account the engine is running for.
#[derive(Debug, Clone)]
pub struct AccountContext {
    pub mailbox_id: i64,
    pub mail_domain: String,
    /// Root secret used to derive namespace keypairs.
    pub secret_box_priv_key: String,
}

/// Everything a service call needs: storage, the upstream relay, the
/// keypair cache, and the account context.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub relay: Arc<dyn MailRelay>,
    pub keypairs: KeypairCache,
    pub account: AccountContext,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        relay: Arc<dyn MailRelay>,
        account: AccountContext,
    ) -> Self {
        Self {
            pool,
            relay,
            keypairs: KeypairCache::new(),
            account,
        }
    }
}
