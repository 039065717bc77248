use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::types::error::{MaskboxError, Result};
use crate::types::AliasNamespace;

use super::DbPool;

pub fn insert_namespace(pool: &DbPool, ns: &AliasNamespace) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO alias_namespaces (name, public_key, private_key, mailbox_id, domain, disabled, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            ns.name,
            ns.public_key,
            ns.private_key,
            ns.mailbox_id,
            ns.domain,
            ns.disabled as i32,
            ns.created_at.to_rfc3339(),
            ns.updated_at.to_rfc3339(),
        ],
    )
    .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(())
}

pub fn get_namespace(pool: &DbPool, name: &str) -> Result<Option<AliasNamespace>> {
    let conn = pool.get()?;
    let mut stmt = conn
        .prepare(
            "SELECT name, public_key, private_key, mailbox_id, domain, disabled, created_at, updated_at
             FROM alias_namespaces WHERE name = ?1",
        )
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let result = stmt
        .query_row(params![name], row_to_namespace)
        .optional()
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(result)
}

/// Namespaces belonging to a mailbox, sorted by name ascending.
pub fn list_namespaces_by_mailbox(pool: &DbPool, mailbox_id: i64) -> Result<Vec<AliasNamespace>> {
    let conn = pool.get()?;
    let mut stmt = conn
        .prepare(
            "SELECT name, public_key, private_key, mailbox_id, domain, disabled, created_at, updated_at
             FROM alias_namespaces WHERE mailbox_id = ?1
             ORDER BY name ASC",
        )
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let rows = stmt
        .query_map(params![mailbox_id], row_to_namespace)
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let mut namespaces = Vec::new();
    for row in rows {
        namespaces.push(row?);
    }
    Ok(namespaces)
}

/// Flip the disabled flag. No cascade: addresses under the namespace stay
/// individually controllable.
pub fn set_namespace_disabled(pool: &DbPool, name: &str, disabled: bool) -> Result<bool> {
    let conn = pool.get()?;
    let changed = conn
        .execute(
            "UPDATE alias_namespaces SET disabled = ?1, updated_at = ?2 WHERE name = ?3",
            params![disabled as i32, Utc::now().to_rfc3339(), name],
        )
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(changed > 0)
}

fn row_to_namespace(row: &Row) -> std::result::Result<AliasNamespace, rusqlite::Error> {
    Ok(AliasNamespace {
        name: row.get(0)?,
        public_key: row.get(1)?,
        private_key: row.get(2)?,
        mailbox_id: row.get(3)?,
        domain: row.get(4)?,
        disabled: row.get::<_, i32>(5)? != 0,
        created_at: parse_timestamp(row.get::<_, String>(6).ok()),
        updated_at: parse_timestamp(row.get::<_, String>(7).ok()),
    })
}

pub(super) fn parse_timestamp(value: Option<String>) -> DateTime<Utc> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
