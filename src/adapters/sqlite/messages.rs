use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::types::error::{MaskboxError, Result};
use crate::types::EmailMessage;

use super::namespaces::parse_timestamp;
use super::DbPool;

const EMAIL_COLUMNS: &str = "email_id, folder_id, alias_id, subject, from_address, to_address,
    cc_address, bcc_address, body_as_text, body_as_html, attachments, unread, date, created_at, updated_at";

pub fn insert_email(pool: &DbPool, email: &EmailMessage) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO emails (email_id, folder_id, alias_id, subject, from_address, to_address,
            cc_address, bcc_address, body_as_text, body_as_html, attachments, unread, date,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            email.email_id,
            email.folder_id,
            email.alias_id,
            email.subject,
            email.from_address,
            email.to_address,
            email.cc_address,
            email.bcc_address,
            email.body_as_text,
            email.body_as_html,
            email.attachments,
            email.unread as i32,
            email.date.to_rfc3339(),
            email.created_at.to_rfc3339(),
            email.updated_at.to_rfc3339(),
        ],
    )
    .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(())
}

pub fn get_email_by_id(pool: &DbPool, email_id: &str) -> Result<Option<EmailMessage>> {
    let conn = pool.get()?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE email_id = ?1"
        ))
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let result = stmt
        .query_row(params![email_id], row_to_email)
        .optional()
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(result)
}

pub fn get_emails_by_folder(pool: &DbPool, folder_id: i64) -> Result<Vec<EmailMessage>> {
    let conn = pool.get()?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE folder_id = ?1 ORDER BY date DESC"
        ))
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let rows = stmt
        .query_map(params![folder_id], row_to_email)
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let mut emails = Vec::new();
    for row in rows {
        emails.push(row?);
    }
    Ok(emails)
}

pub fn get_emails_by_alias(pool: &DbPool, alias_id: &str) -> Result<Vec<EmailMessage>> {
    let conn = pool.get()?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE alias_id = ?1 ORDER BY date DESC"
        ))
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let rows = stmt
        .query_map(params![alias_id], row_to_email)
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let mut emails = Vec::new();
    for row in rows {
        emails.push(row?);
    }
    Ok(emails)
}

/// Move a set of messages, each to its own target folder, in one
/// transaction. Keyed by immutable message identity, never positional.
pub fn move_emails(pool: &DbPool, moves: &[(String, i64)]) -> Result<()> {
    let conn = pool.get()?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let now = Utc::now().to_rfc3339();
    for (email_id, to_folder) in moves {
        tx.execute(
            "UPDATE emails SET folder_id = ?1, updated_at = ?2 WHERE email_id = ?3",
            params![to_folder, now, email_id],
        )
        .map_err(|e| MaskboxError::Database(e.to_string()))?;
    }

    tx.commit()
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(())
}

/// Delete messages by id. The FTS index rows cascade via trigger;
/// attachment files are the attachment service's concern.
pub fn delete_emails(pool: &DbPool, email_ids: &[String]) -> Result<usize> {
    if email_ids.is_empty() {
        return Ok(0);
    }

    let conn = pool.get()?;
    let placeholders: Vec<String> = (0..email_ids.len()).map(|i| format!("?{}", i + 1)).collect();
    let sql = format!(
        "DELETE FROM emails WHERE email_id IN ({})",
        placeholders.join(",")
    );

    let params_refs: Vec<&dyn rusqlite::ToSql> = email_ids
        .iter()
        .map(|id| id as &dyn rusqlite::ToSql)
        .collect();

    let removed = conn
        .execute(&sql, params_refs.as_slice())
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(removed)
}

pub fn set_email_unread(pool: &DbPool, email_id: &str, unread: bool) -> Result<bool> {
    let conn = pool.get()?;
    let changed = conn
        .execute(
            "UPDATE emails SET unread = ?1, updated_at = ?2 WHERE email_id = ?3",
            params![unread as i32, Utc::now().to_rfc3339(), email_id],
        )
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    Ok(changed > 0)
}

/// Full-text search over subject/body. The query is quoted so user input
/// is matched literally instead of being parsed as FTS5 syntax.
pub fn search_emails(pool: &DbPool, query: &str) -> Result<Vec<EmailMessage>> {
    let conn = pool.get()?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails
             WHERE rowid IN (SELECT rowid FROM emails_fts WHERE emails_fts MATCH ?1)
             ORDER BY date DESC"
        ))
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let quoted = format!("\"{}\"", query.replace('"', ""));
    let rows = stmt
        .query_map(params![quoted], row_to_email)
        .map_err(|e| MaskboxError::Database(e.to_string()))?;

    let mut emails = Vec::new();
    for row in rows {
        emails.push(row?);
    }
    Ok(emails)
}

fn row_to_email(row: &Row) -> std::result::Result<EmailMessage, rusqlite::Error> {
    Ok(EmailMessage {
        email_id: row.get(0)?,
        folder_id: row.get(1)?,
        alias_id: row.get(2)?,
        subject: row.get(3)?,
        from_address: row.get(4)?,
        to_address: row.get(5)?,
        cc_address: row.get(6)?,
        bcc_address: row.get(7)?,
        body_as_text: row.get(8)?,
        body_as_html: row.get(9)?,
        attachments: row.get(10)?,
        unread: row.get::<_, i32>(11)? != 0,
        date: parse_timestamp(row.get::<_, String>(12).ok()),
        created_at: parse_timestamp(row.get::<_, String>(13).ok()),
        updated_at: parse_timestamp(row.get::<_, String>(14).ok()),
    })
}
