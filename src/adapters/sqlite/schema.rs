//! Database schema
//!
//! Three collections plus an external-content FTS5 index over message
//! subject/body. `aliases.alias_id` is the composite `"namespace#address"`
//! key; its PRIMARY KEY constraint is what makes concurrent on-the-fly
//! creation upsert-safe.

use crate::types::error::{MaskboxError, Result};

use super::DbPool;

pub fn init_schema(pool: &DbPool) -> Result<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        r#"
        -- Alias namespaces, one row per registered subdomain prefix
        CREATE TABLE IF NOT EXISTS alias_namespaces (
            name TEXT PRIMARY KEY,
            public_key TEXT NOT NULL,
            private_key TEXT NOT NULL,
            mailbox_id INTEGER NOT NULL,
            domain TEXT NOT NULL,
            disabled INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_namespaces_mailbox ON alias_namespaces(mailbox_id);

        -- Alias addresses under a namespace
        CREATE TABLE IF NOT EXISTS aliases (
            alias_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            namespace_key TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            description TEXT,
            fwd_addresses TEXT,  -- comma-joined, NULL when empty
            disabled INTEGER NOT NULL DEFAULT 0,
            whitelisted INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_aliases_namespace ON aliases(namespace_key);
        CREATE INDEX IF NOT EXISTS idx_aliases_created ON aliases(created_at DESC);

        -- Messages
        CREATE TABLE IF NOT EXISTS emails (
            email_id TEXT PRIMARY KEY,
            folder_id INTEGER NOT NULL,
            alias_id TEXT,
            subject TEXT NOT NULL DEFAULT '',
            from_address TEXT NOT NULL DEFAULT '',
            to_address TEXT NOT NULL DEFAULT '',
            cc_address TEXT NOT NULL DEFAULT '',
            bcc_address TEXT NOT NULL DEFAULT '',
            body_as_text TEXT NOT NULL DEFAULT '',
            body_as_html TEXT NOT NULL DEFAULT '',
            attachments TEXT NOT NULL DEFAULT '',
            unread INTEGER NOT NULL DEFAULT 0,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_emails_folder ON emails(folder_id);
        CREATE INDEX IF NOT EXISTS idx_emails_alias ON emails(alias_id);
        CREATE INDEX IF NOT EXISTS idx_emails_date ON emails(date DESC);

        -- Full-text index over subject/body, kept in sync by triggers
        CREATE VIRTUAL TABLE IF NOT EXISTS emails_fts USING fts5(
            subject,
            body_as_text,
            content='emails',
            content_rowid='rowid'
        );

        CREATE TRIGGER IF NOT EXISTS emails_fts_insert AFTER INSERT ON emails BEGIN
            INSERT INTO emails_fts(rowid, subject, body_as_text)
            VALUES (new.rowid, new.subject, new.body_as_text);
        END;

        CREATE TRIGGER IF NOT EXISTS emails_fts_delete AFTER DELETE ON emails BEGIN
            INSERT INTO emails_fts(emails_fts, rowid, subject, body_as_text)
            VALUES ('delete', old.rowid, old.subject, old.body_as_text);
        END;

        CREATE TRIGGER IF NOT EXISTS emails_fts_update AFTER UPDATE ON emails BEGIN
            INSERT INTO emails_fts(emails_fts, rowid, subject, body_as_text)
            VALUES ('delete', old.rowid, old.subject, old.body_as_text);
            INSERT INTO emails_fts(rowid, subject, body_as_text)
            VALUES (new.rowid, new.subject, new.body_as_text);
        END;
    "#,
    )
    .map_err(|e| MaskboxError::Database(format!("Failed to initialize schema: {}", e)))?;

    Ok(())
}
