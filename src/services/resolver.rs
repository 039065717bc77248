//! Alias resolution
//!
//! Given a destination address, decide whether it binds to a known alias,
//! qualifies for on-the-fly creation, or passes through unaliased. This is
//! a pure decision step: all side effects (creating the alias, bumping its
//! count) belong to the ingestion pipeline.

use mailparse::MailAddr;
use tracing::debug;

use crate::adapters::sqlite::{aliases, namespaces, DbPool};
use crate::types::error::Result;
use crate::types::{AliasAddress, AliasId};

/// Outcome of resolving one destination address.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Not alias mail: unknown domain, unknown/disabled namespace, or a
    /// disabled alias address. Delivered without a binding, never rejected.
    Unaliased,
    /// The address matches a live alias.
    Bound(AliasAddress),
    /// Syntactically valid, never-seen address under a live namespace owned
    /// by this mailbox: the pipeline must create it before binding.
    CreateOnTheFly(AliasId),
}

/// Extract an alias candidate from a destination field.
///
/// Accepts both bare addresses and `Name <addr>` forms. Only
/// `local#sub@<mail_domain>` shapes on the administered domain qualify;
/// anything else is ordinary mail.
pub fn parse_alias_candidate(destination: &str, mail_domain: &str) -> Option<AliasId> {
    let bare = extract_bare_address(destination)?;

    let (local, domain) = bare.rsplit_once('@')?;
    if !domain.eq_ignore_ascii_case(mail_domain) {
        return None;
    }

    let (namespace, address) = local.split_once('#')?;
    AliasId::new(namespace, address).ok()
}

/// Resolve a parsed candidate against the registries.
pub fn resolve(pool: &DbPool, candidate: &AliasId) -> Result<Resolution> {
    if let Some(alias) = aliases::get_alias(pool, &candidate.to_string())? {
        if alias.disabled {
            debug!("Alias {} is disabled, delivering unaliased", alias.alias_id);
            return Ok(Resolution::Unaliased);
        }
        return Ok(Resolution::Bound(alias));
    }

    match namespaces::get_namespace(pool, candidate.namespace())? {
        Some(ns) if !ns.disabled => Ok(Resolution::CreateOnTheFly(candidate.clone())),
        _ => {
            debug!(
                "Namespace {} unknown or disabled, delivering unaliased",
                candidate.namespace()
            );
            Ok(Resolution::Unaliased)
        }
    }
}

fn extract_bare_address(destination: &str) -> Option<String> {
    let trimmed = destination.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = mailparse::addrparse(trimmed) {
        for addr in parsed.iter() {
            match addr {
                MailAddr::Single(info) => return Some(info.addr.clone()),
                MailAddr::Group(group) => {
                    if let Some(info) = group.addrs.first() {
                        return Some(info.addr.clone());
                    }
                }
            }
        }
    }

    // addrparse can choke on the '#' local part; the raw string is already
    // a bare address in that case.
    Some(trimmed.trim_matches(|c| c == '<' || c == '>').to_string())
}
