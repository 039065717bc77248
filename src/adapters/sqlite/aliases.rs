use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::types::error::{MaskboxError, Result};
use crate::types::AliasAddress;

use super::namespaces::parse_timestamp;
use super::DbPool;

/// Flatten a forward list for storage: comma-joined, NULL when empty.
pub fn flatten_fwd_addresses(fwd: &[String]) -> Option<String> {
    if fwd.is_empty() {
        None
    } else {
        Some(fwd.join(","))
    }
}

/// Inverse of [`flatten_fwd_addresses`]: absent/empty => `[]`.
pub fn unflatten_fwd_addresses(stored: Option<String>) -> Vec<String> {
    match stored {
        Some(s) if !s.is_empty() => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Insert an alias unless one with the same `alias_id` already exists.
///
/// Returns `true` when the row was inserted. The `ON CONFLICT DO NOTHING`
/// keeps concurrent on-the-fly creation upsert-safe: the loser of the race
/// sees `false` and falls back to found semantics.
pub fn insert_alias_if_absent(pool: &DbPool, alias: &AliasAddress) -> Result<bool> {
    let conn = pool.get()?;
    let inserted = conn
        .execute(
            "INSERT INTO aliases (alias_id, name, namespace_key, count, description, fwd_addresses,
                disabled, whitelisted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(alias_id) DO NOTHING",
            params![
                alias.alias_id,
                alias.name,
                alias.namespace_key,
                alias.count,
                alias.description,
                flatten_fwd_addresses(&alias.fwd_addresses),
                alias.disabled as i32,
                alias.whitelisted as i32,
                alias.created_at.to_rfc3339(),
                alias.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(inserted > 0)
}

pub fn get_alias(pool: &DbPool, alias_id: &str) -> Result<Option<AliasAddress>> {
    let conn = pool.get()?;
    let mut stmt = conn
        .prepare(
            "SELECT alias_id, name, namespace_key, count, description, fwd_addresses,
                    disabled, whitelisted, created_at, updated_at
             FROM aliases WHERE alias_id = ?1",
        )
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let result = stmt
        .query_row(params![alias_id], row_to_alias)
        .optional()
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(result)
}

/// Update the mutable forwarding fields of an alias. Returns the number of
/// rows touched so callers can detect a missing local record.
pub fn update_alias_rules(
    pool: &DbPool,
    alias_id: &str,
    fwd_addresses: &[String],
    description: &str,
    disabled: bool,
) -> Result<usize> {
    let conn = pool.get()?;
    let changed = conn
        .execute(
            "UPDATE aliases SET fwd_addresses = ?1, description = ?2, disabled = ?3, updated_at = ?4
             WHERE alias_id = ?5",
            params![
                flatten_fwd_addresses(fwd_addresses),
                description,
                disabled as i32,
                Utc::now().to_rfc3339(),
                alias_id,
            ],
        )
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(changed)
}

/// Hard delete. Returns the number of rows removed.
pub fn delete_alias(pool: &DbPool, alias_id: &str) -> Result<usize> {
    let conn = pool.get()?;
    let removed = conn
        .execute("DELETE FROM aliases WHERE alias_id = ?1", params![alias_id])
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(removed)
}

/// Atomic usage-count increment. A single UPDATE so concurrent ingestion
/// never loses counts to a read-modify-write race.
pub fn increment_alias_count(pool: &DbPool, alias_id: &str, amount: i64) -> Result<bool> {
    let conn = pool.get()?;
    let changed = conn
        .execute(
            "UPDATE aliases SET count = count + ?1, updated_at = ?2 WHERE alias_id = ?3",
            params![amount, Utc::now().to_rfc3339(), alias_id],
        )
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(changed > 0)
}

/// Aliases under any of the given namespaces, newest first.
pub fn list_aliases_by_namespaces(
    pool: &DbPool,
    namespace_keys: &[String],
) -> Result<Vec<AliasAddress>> {
    if namespace_keys.is_empty() {
        return Ok(Vec::new());
    }

    let conn = pool.get()?;
    let placeholders: Vec<String> = (0..namespace_keys.len())
        .map(|i| format!("?{}", i + 1))
        .collect();
    let sql = format!(
        "SELECT alias_id, name, namespace_key, count, description, fwd_addresses,
                disabled, whitelisted, created_at, updated_at
         FROM aliases WHERE namespace_key IN ({})
         ORDER BY created_at DESC",
        placeholders.join(",")
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let params_refs: Vec<&dyn rusqlite::ToSql> = namespace_keys
        .iter()
        .map(|k| k as &dyn rusqlite::ToSql)
        .collect();

    let rows = stmt
        .query_map(params_refs.as_slice(), row_to_alias)
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let mut aliases = Vec::new();
    for row in rows {
        aliases.push(row?);
    }
    Ok(aliases)
}

fn row_to_alias(row: &Row) -> std::result::Result<AliasAddress, rusqlite::Error> {
    Ok(AliasAddress {
        alias_id: row.get(0)?,
        name: row.get(1)?,
        namespace_key: row.get(2)?,
        count: row.get(3)?,
        description: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        fwd_addresses: unflatten_fwd_addresses(row.get(5)?),
        disabled: row.get::<_, i32>(6)? != 0,
        whitelisted: row.get::<_, i32>(7)? != 0,
        created_at: parse_timestamp(row.get::<_, String>(8).ok()),
        updated_at: parse_timestamp(row.get::<_, String>(9).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::in_memory_pool;
    use chrono::{Duration, Utc};

    fn alias(alias_id: &str, namespace: &str, fwd: &[&str]) -> AliasAddress {
        let now = Utc::now();
        AliasAddress {
            alias_id: alias_id.to_string(),
            name: alias_id.split('#').nth(1).unwrap_or_default().to_string(),
            namespace_key: namespace.to_string(),
            count: 0,
            description: String::new(),
            fwd_addresses: fwd.iter().map(|s| s.to_string()).collect(),
            disabled: false,
            whitelisted: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_fwd_addresses_round_trip() {
        assert_eq!(
            flatten_fwd_addresses(&["a".into(), "b".into(), "c".into()]),
            Some("a,b,c".to_string())
        );
        assert_eq!(flatten_fwd_addresses(&[]), None);

        assert_eq!(
            unflatten_fwd_addresses(Some("a,b,c".to_string())),
            vec!["a", "b", "c"]
        );
        assert!(unflatten_fwd_addresses(Some(String::new())).is_empty());
        assert!(unflatten_fwd_addresses(None).is_empty());
    }

    #[test]
    fn test_insert_is_upsert_safe() {
        let pool = in_memory_pool().unwrap();

        assert!(insert_alias_if_absent(&pool, &alias("ns#a", "ns", &["x@y.z"])).unwrap());
        // Second writer loses the race and falls back to found semantics.
        assert!(!insert_alias_if_absent(&pool, &alias("ns#a", "ns", &[])).unwrap());

        let stored = get_alias(&pool, "ns#a").unwrap().unwrap();
        assert_eq!(stored.fwd_addresses, vec!["x@y.z"]);
    }

    #[test]
    fn test_increment_count() {
        let pool = in_memory_pool().unwrap();
        insert_alias_if_absent(&pool, &alias("ns#a", "ns", &[])).unwrap();

        for _ in 0..5 {
            assert!(increment_alias_count(&pool, "ns#a", 1).unwrap());
        }
        increment_alias_count(&pool, "ns#a", 3).unwrap();

        assert_eq!(get_alias(&pool, "ns#a").unwrap().unwrap().count, 8);
        assert!(!increment_alias_count(&pool, "ns#missing", 1).unwrap());
    }

    #[test]
    fn test_list_by_namespaces_newest_first() {
        let pool = in_memory_pool().unwrap();

        let mut older = alias("ns1#old", "ns1", &[]);
        older.created_at = Utc::now() - Duration::hours(1);
        insert_alias_if_absent(&pool, &older).unwrap();
        insert_alias_if_absent(&pool, &alias("ns1#new", "ns1", &[])).unwrap();
        insert_alias_if_absent(&pool, &alias("ns2#other", "ns2", &[])).unwrap();
        insert_alias_if_absent(&pool, &alias("ns3#excluded", "ns3", &[])).unwrap();

        let listed = list_aliases_by_namespaces(&pool, &["ns1".into(), "ns2".into()]).unwrap();
        let ids: Vec<&str> = listed.iter().map(|a| a.alias_id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&"ns3#excluded"));
        // ns1#new and ns2#other are newer than ns1#old
        assert_eq!(ids.last(), Some(&"ns1#old"));

        assert!(list_aliases_by_namespaces(&pool, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_update_and_delete_report_row_counts() {
        let pool = in_memory_pool().unwrap();
        insert_alias_if_absent(&pool, &alias("ns#a", "ns", &[])).unwrap();

        assert_eq!(
            update_alias_rules(&pool, "ns#a", &["f@g.h".into()], "shopping", true).unwrap(),
            1
        );
        let stored = get_alias(&pool, "ns#a").unwrap().unwrap();
        assert_eq!(stored.fwd_addresses, vec!["f@g.h"]);
        assert_eq!(stored.description, "shopping");
        assert!(stored.disabled);

        assert_eq!(update_alias_rules(&pool, "ns#missing", &[], "", false).unwrap(), 0);
        assert_eq!(delete_alias(&pool, "ns#a").unwrap(), 1);
        assert_eq!(delete_alias(&pool, "ns#a").unwrap(), 0);
    }
}
