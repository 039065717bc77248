//! Alias namespace and address registries
//!
//! Every mutating operation follows the upstream-then-local pattern: the
//! relay claim happens first and a failure there leaves no local trace.
//! The reverse window (upstream applied, local write failed) is surfaced as
//! `PartialUpdate` so callers can retry the local half only.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::adapters::sqlite::{aliases, namespaces};
use crate::crypto;
use crate::relay::{RegisterAddressRequest, RegisterNamespaceRequest};
use crate::state::AppState;
use crate::types::error::{MaskboxError, Result};
use crate::types::{AliasAddress, AliasId, AliasNamespace};

/// Register a new namespace for a mailbox.
///
/// Derives the namespace keypair, claims `namespace@mail_domain` upstream
/// with the public key, and only then persists the record. The derived
/// keypair is installed into the cache so the resolver can use it at once.
pub async fn register_namespace(
    state: &AppState,
    mailbox_id: i64,
    namespace: &str,
) -> Result<AliasNamespace> {
    let keypair = crypto::derive_namespace_keypair(
        &state.account.secret_box_priv_key,
        namespace,
        &state.account.mail_domain,
    )?;

    let registration = state
        .relay
        .register_alias_name(RegisterNamespaceRequest {
            alias_name: namespace.to_string(),
            domain: state.account.mail_domain.clone(),
            key: keypair.public_key.clone(),
        })
        .await?;

    let now = Utc::now();
    let ns = AliasNamespace {
        name: namespace.to_string(),
        public_key: registration.key,
        private_key: keypair.private_key.clone(),
        mailbox_id,
        domain: state.account.mail_domain.clone(),
        disabled: false,
        created_at: now,
        updated_at: now,
    };

    namespaces::insert_namespace(&state.pool, &ns)?;
    state.keypairs.install(namespace, ns.keypair());

    info!("Registered alias namespace {}@{}", namespace, ns.domain);
    Ok(ns)
}

/// Namespaces for a mailbox, name ascending.
///
/// Rebuilds the keypair cache entry for every returned namespace: after a
/// fresh process start the cache is empty and cannot be trusted.
pub fn get_mailbox_namespaces(state: &AppState, mailbox_id: i64) -> Result<Vec<AliasNamespace>> {
    let listed = namespaces::list_namespaces_by_mailbox(&state.pool, mailbox_id)?;

    for ns in &listed {
        state.keypairs.install(&ns.name, ns.keypair());
    }

    Ok(listed)
}

/// Disable (or re-enable) a namespace. Field mutation only; existing
/// addresses keep their own forwarding state.
pub fn set_namespace_disabled(state: &AppState, name: &str, disabled: bool) -> Result<()> {
    if !namespaces::set_namespace_disabled(&state.pool, name, disabled)? {
        return Err(MaskboxError::NotFound(format!("namespace {name}")));
    }
    Ok(())
}

/// Parameters shared by explicit address registration and update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressParams {
    pub namespace_name: String,
    pub domain: String,
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fwd_addresses: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// Explicitly register an alias address under a namespace.
pub async fn register_address(state: &AppState, params: AddressParams) -> Result<AliasAddress> {
    let alias_id = AliasId::new(&params.namespace_name, &params.address)?;

    state
        .relay
        .register_alias_address(RegisterAddressRequest {
            alias_address: alias_id.full_address(&params.domain),
            forwards_to: params.fwd_addresses.clone(),
            // Aliases created through this path are trusted by default.
            whitelisted: true,
            disabled: params.disabled,
        })
        .await?;

    let now = Utc::now();
    let alias = AliasAddress {
        alias_id: alias_id.to_string(),
        name: params.address,
        namespace_key: params.namespace_name,
        count: 0,
        description: params.description,
        fwd_addresses: params.fwd_addresses,
        disabled: params.disabled,
        whitelisted: true,
        created_at: now,
        updated_at: now,
    };

    if !aliases::insert_alias_if_absent(&state.pool, &alias)? {
        return Err(MaskboxError::Validation(format!(
            "alias {alias_id} is already registered"
        )));
    }

    info!("Registered alias address {}", alias.alias_id);
    Ok(alias)
}

/// Create an alias implicitly during ingestion.
///
/// Defaults: no forwards, enabled, whitelisted, empty description. Returns
/// the stored record and whether this call actually created it — the loser
/// of a concurrent creation race gets the existing row and `false`.
pub async fn register_on_the_fly(
    state: &AppState,
    alias_id: &AliasId,
) -> Result<(AliasAddress, bool)> {
    state
        .relay
        .register_alias_address(RegisterAddressRequest {
            alias_address: alias_id.full_address(&state.account.mail_domain),
            forwards_to: Vec::new(),
            whitelisted: true,
            disabled: false,
        })
        .await?;

    let now = Utc::now();
    let alias = AliasAddress {
        alias_id: alias_id.to_string(),
        name: alias_id.address().to_string(),
        namespace_key: alias_id.namespace().to_string(),
        count: 0,
        description: String::new(),
        fwd_addresses: Vec::new(),
        disabled: false,
        whitelisted: true,
        created_at: now,
        updated_at: now,
    };

    if aliases::insert_alias_if_absent(&state.pool, &alias)? {
        info!("Created on-the-fly alias {}", alias.alias_id);
        return Ok((alias, true));
    }

    let existing = aliases::get_alias(&state.pool, &alias.alias_id)?.ok_or_else(|| {
        MaskboxError::Database(format!("alias {} vanished during creation", alias.alias_id))
    })?;
    // A concurrent writer may have raced us in with a disabled row; a
    // disabled alias never gets bound, same as in resolution.
    if existing.disabled {
        return Err(MaskboxError::Validation(format!(
            "alias {} is disabled",
            existing.alias_id
        )));
    }
    Ok((existing, false))
}

/// Update an alias address's forwarding rules.
///
/// Upstream is re-registered first; a local write that then fails or finds
/// no row leaves upstream reconciled and local stale, which is exactly the
/// `PartialUpdate` contract.
pub async fn update_address(state: &AppState, params: AddressParams) -> Result<()> {
    let alias_id = AliasId::new(&params.namespace_name, &params.address)?;

    state
        .relay
        .update_alias_address(RegisterAddressRequest {
            alias_address: alias_id.full_address(&params.domain),
            forwards_to: params.fwd_addresses.clone(),
            whitelisted: true,
            disabled: params.disabled,
        })
        .await?;

    let changed = aliases::update_alias_rules(
        &state.pool,
        &alias_id.to_string(),
        &params.fwd_addresses,
        &params.description,
        params.disabled,
    )
    .map_err(|e| MaskboxError::PartialUpdate(format!(
        "upstream updated but local write failed for {alias_id}: {e}"
    )))?;

    if changed == 0 {
        return Err(MaskboxError::PartialUpdate(format!(
            "upstream updated but no local record for {alias_id}"
        )));
    }

    Ok(())
}

/// Remove an alias address: upstream forwarding first, then the local row.
///
/// Local removal is idempotent (a missing row is fine); only a failing
/// local write after upstream removal is a `PartialUpdate`.
pub async fn remove_address(
    state: &AppState,
    namespace_name: &str,
    domain: &str,
    address: &str,
) -> Result<()> {
    let alias_id = AliasId::new(namespace_name, address)?;

    state
        .relay
        .remove_alias_address(&alias_id.full_address(domain))
        .await?;

    aliases::delete_alias(&state.pool, &alias_id.to_string()).map_err(|e| {
        MaskboxError::PartialUpdate(format!(
            "upstream removed but local delete failed for {alias_id}: {e}"
        ))
    })?;

    info!("Removed alias address {}", alias_id);
    Ok(())
}

/// Atomic usage-count bump, one per ingested message.
pub fn update_alias_count(state: &AppState, alias_id: &str, amount: i64) -> Result<bool> {
    aliases::increment_alias_count(&state.pool, alias_id, amount)
}

/// Aliases under the given namespaces, newest first, forwards unflattened.
pub fn get_mailbox_aliases(
    state: &AppState,
    namespace_keys: &[String],
) -> Result<Vec<AliasAddress>> {
    aliases::list_aliases_by_namespaces(&state.pool, namespace_keys)
}
