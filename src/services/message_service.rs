//! Read/maintenance operations over the message store.

use crate::adapters::sqlite::messages;
use crate::state::AppState;
use crate::types::error::{MaskboxError, Result};
use crate::types::{EmailMessage, MoveMessageRequest};

pub fn get_messages_by_folder_id(state: &AppState, folder_id: i64) -> Result<Vec<EmailMessage>> {
    messages::get_emails_by_folder(&state.pool, folder_id)
}

pub fn get_messages_by_alias_id(state: &AppState, alias_id: &str) -> Result<Vec<EmailMessage>> {
    messages::get_emails_by_alias(&state.pool, alias_id)
}

pub fn get_message_by_id(state: &AppState, email_id: &str) -> Result<EmailMessage> {
    messages::get_email_by_id(&state.pool, email_id)?
        .ok_or_else(|| MaskboxError::NotFound(format!("message {email_id}")))
}

/// Move each message to its requested folder, transactionally.
pub fn move_messages(state: &AppState, moves: &[MoveMessageRequest]) -> Result<()> {
    let pairs: Vec<(String, i64)> = moves
        .iter()
        .map(|m| (m.email_id.clone(), m.folder.to_id))
        .collect();
    messages::move_emails(&state.pool, &pairs)
}

pub fn mark_as_unread(state: &AppState, email_id: &str) -> Result<()> {
    if !messages::set_email_unread(&state.pool, email_id, true)? {
        return Err(MaskboxError::NotFound(format!("message {email_id}")));
    }
    Ok(())
}

/// Delete messages by id. Missing ids are ignored; returns how many rows
/// actually went away.
pub fn remove_messages(state: &AppState, email_ids: &[String]) -> Result<usize> {
    messages::delete_emails(&state.pool, email_ids)
}

/// Full-text search over subject and bodies, newest first.
pub fn search_mailbox(state: &AppState, query: &str) -> Result<Vec<EmailMessage>> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    messages::search_emails(&state.pool, trimmed)
}
