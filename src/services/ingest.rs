//! Message ingestion pipeline
//!
//! Each envelope in a batch is resolved against the alias registries,
//! bound (creating the alias on the fly when the namespace is live),
//! filed into a folder and persisted. Resolution failure is never a
//! delivery failure: a message whose alias cannot be created is stored
//! unaliased. Only storage failures land in the failure list, and a
//! failed message never stops the rest of the batch.

use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::adapters::sqlite::{aliases, messages};
use crate::services::resolver::{self, Resolution};
use crate::state::AppState;
use crate::types::error::Result;
use crate::types::{folder, AliasAddress, EmailEnvelope, EmailMessage, IngestType};

/// Result of one ingestion batch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    /// Messages persisted, in input order (failed entries omitted).
    pub msg_arr: Vec<EmailMessage>,
    /// Aliases created on the fly by this batch.
    pub new_aliases: Vec<AliasAddress>,
    pub failures: Vec<IngestFailure>,
}

/// A message that could not be persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestFailure {
    pub email_id: String,
    pub error: String,
}

/// Persist a batch of envelopes.
pub async fn save_messages(
    state: &AppState,
    kind: IngestType,
    envelopes: Vec<EmailEnvelope>,
) -> Result<IngestOutcome> {
    let mut outcome = IngestOutcome::default();

    for envelope in envelopes {
        let email_id = envelope
            .email_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let (alias_id, created) = bind_alias(state, kind, &envelope).await;
        if let Some(alias) = created {
            outcome.new_aliases.push(alias);
        }

        let message = build_message(kind, envelope, email_id.clone(), alias_id);

        if let Err(e) = messages::insert_email(&state.pool, &message) {
            warn!("Failed to persist message {email_id}: {e}");
            outcome.failures.push(IngestFailure {
                email_id,
                error: e.to_string(),
            });
            continue;
        }

        // The message is already persisted at this point; a failed count
        // bump is reported as a per-item diagnostic, not rolled back.
        if let Some(id) = &message.alias_id {
            if let Err(e) = aliases::increment_alias_count(&state.pool, id, 1) {
                warn!("Failed to bump usage count for {id}: {e}");
                outcome.failures.push(IngestFailure {
                    email_id: email_id.clone(),
                    error: format!("usage count for {id} not incremented: {e}"),
                });
            }
        }

        outcome.msg_arr.push(message);
    }

    Ok(outcome)
}

/// Resolve the envelope's routed address to an alias binding. Returns the
/// bound alias id (if any) and the alias record when this call created it.
async fn bind_alias(
    state: &AppState,
    kind: IngestType,
    envelope: &EmailEnvelope,
) -> (Option<String>, Option<AliasAddress>) {
    // Incoming mail is routed by recipient; drafts and outgoing mail bind
    // by the sending identity.
    let routed = match kind {
        IngestType::Incoming => &envelope.to,
        IngestType::Draft | IngestType::Outgoing => &envelope.from,
    };

    let Some(candidate) = resolver::parse_alias_candidate(routed, &state.account.mail_domain)
    else {
        return (None, None);
    };

    match resolver::resolve(&state.pool, &candidate) {
        Ok(Resolution::Bound(alias)) => (Some(alias.alias_id), None),
        Ok(Resolution::CreateOnTheFly(alias_id)) => {
            match super::alias_service::register_on_the_fly(state, &alias_id).await {
                Ok((alias, true)) => (Some(alias.alias_id.clone()), Some(alias)),
                Ok((alias, false)) => (Some(alias.alias_id), None),
                Err(e) => {
                    warn!("On-the-fly creation of {alias_id} failed, storing unaliased: {e}");
                    (None, None)
                }
            }
        }
        Ok(Resolution::Unaliased) => (None, None),
        Err(e) => {
            warn!("Alias resolution for '{routed}' failed, storing unaliased: {e}");
            (None, None)
        }
    }
}

fn build_message(
    kind: IngestType,
    envelope: EmailEnvelope,
    email_id: String,
    alias_id: Option<String>,
) -> EmailMessage {
    // Alias-bound incoming mail is filed in the alias folder unless the
    // envelope pins a folder itself.
    let folder_id = envelope.folder_id.unwrap_or_else(|| {
        if kind == IngestType::Incoming && alias_id.is_some() {
            folder::ALIAS
        } else {
            kind.default_folder()
        }
    });

    let now = Utc::now();
    EmailMessage {
        email_id,
        folder_id,
        alias_id,
        subject: envelope.subject,
        from_address: envelope.from,
        to_address: envelope.to,
        cc_address: envelope.cc,
        bcc_address: envelope.bcc,
        body_as_text: envelope.body_as_text,
        body_as_html: envelope.body_as_html,
        attachments: envelope.attachments,
        unread: envelope.unread,
        date: envelope.date.unwrap_or(now),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::in_memory_pool;
    use crate::relay::mock::MockRelay;
    use crate::services::alias_service;
    use crate::state::{AccountContext, AppState};
    use std::sync::Arc;

    fn test_state() -> (AppState, Arc<MockRelay>) {
        let relay = Arc::new(MockRelay::new());
        let state = AppState::new(
            in_memory_pool().unwrap(),
            relay.clone(),
            AccountContext {
                mailbox_id: 1,
                mail_domain: "telios.io".to_string(),
                secret_box_priv_key: "test-root-secret".to_string(),
            },
        );
        (state, relay)
    }

    fn envelope(to: &str, subject: &str) -> EmailEnvelope {
        EmailEnvelope {
            to: to.to_string(),
            from: "sender@example.com".to_string(),
            subject: subject.to_string(),
            body_as_text: "hello".to_string(),
            unread: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_incoming_creates_alias_on_the_fly() {
        let (state, _relay) = test_state();
        alias_service::register_namespace(&state, 1, "alice2022").await.unwrap();

        let outcome = save_messages(
            &state,
            IngestType::Incoming,
            vec![envelope("alice2022#onthefly@telios.io", "first")],
        )
        .await
        .unwrap();

        assert_eq!(outcome.msg_arr.len(), 1);
        assert_eq!(outcome.new_aliases.len(), 1);
        assert!(outcome.failures.is_empty());

        let msg = &outcome.msg_arr[0];
        assert_eq!(msg.alias_id.as_deref(), Some("alice2022#onthefly"));
        assert_eq!(msg.folder_id, folder::ALIAS);

        let alias = aliases::get_alias(&state.pool, "alice2022#onthefly")
            .unwrap()
            .unwrap();
        assert_eq!(alias.count, 1);
        assert!(alias.fwd_addresses.is_empty());
        assert!(!alias.disabled);
    }

    #[tokio::test]
    async fn test_existing_alias_binds_without_creating() {
        let (state, _relay) = test_state();
        alias_service::register_namespace(&state, 1, "alice2022").await.unwrap();

        for i in 0..3 {
            let outcome = save_messages(
                &state,
                IngestType::Incoming,
                vec![envelope("alice2022#shop@telios.io", &format!("msg {i}"))],
            )
            .await
            .unwrap();
            // Only the first batch creates the alias
            assert_eq!(outcome.new_aliases.len(), usize::from(i == 0));
        }

        let alias = aliases::get_alias(&state.pool, "alice2022#shop").unwrap().unwrap();
        assert_eq!(alias.count, 3);
    }

    #[tokio::test]
    async fn test_ordinary_mail_passes_through() {
        let (state, relay) = test_state();

        let outcome = save_messages(
            &state,
            IngestType::Incoming,
            vec![
                envelope("bob@telios.io", "no alias shape"),
                envelope("ns#x@gmail.com", "foreign domain"),
                envelope("ghost#x@telios.io", "unknown namespace"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(outcome.msg_arr.len(), 3);
        assert!(outcome.new_aliases.is_empty());
        for msg in &outcome.msg_arr {
            assert!(msg.alias_id.is_none());
            assert_eq!(msg.folder_id, folder::INBOX);
        }
        assert!(relay.calls().is_empty());
    }

    #[tokio::test]
    async fn test_drafts_file_to_drafts_folder() {
        let (state, _relay) = test_state();

        let mut draft = EmailEnvelope {
            from: "me@telios.io".to_string(),
            to: "friend@example.com".to_string(),
            subject: "wip".to_string(),
            ..Default::default()
        };
        let outcome = save_messages(&state, IngestType::Draft, vec![draft.clone()])
            .await
            .unwrap();
        assert_eq!(outcome.msg_arr[0].folder_id, folder::DRAFTS);

        // An explicit folder wins over the default
        draft.folder_id = Some(folder::SENT);
        let outcome = save_messages(&state, IngestType::Draft, vec![draft]).await.unwrap();
        assert_eq!(outcome.msg_arr[0].folder_id, folder::SENT);
    }

    #[tokio::test]
    async fn test_creation_failure_stores_unaliased() {
        let (state, relay) = test_state();
        alias_service::register_namespace(&state, 1, "alice2022").await.unwrap();

        relay.fail_next();
        let outcome = save_messages(
            &state,
            IngestType::Incoming,
            vec![envelope("alice2022#blocked@telios.io", "still delivered")],
        )
        .await
        .unwrap();

        assert_eq!(outcome.msg_arr.len(), 1);
        assert!(outcome.msg_arr[0].alias_id.is_none());
        assert_eq!(outcome.msg_arr[0].folder_id, folder::INBOX);
        assert!(outcome.new_aliases.is_empty());
        assert!(outcome.failures.is_empty());
        assert!(aliases::get_alias(&state.pool, "alice2022#blocked").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_removed_address_is_recreated_on_next_delivery() {
        let (state, _relay) = test_state();
        alias_service::register_namespace(&state, 1, "alice2022").await.unwrap();

        save_messages(
            &state,
            IngestType::Incoming,
            vec![envelope("alice2022#shop@telios.io", "one")],
        )
        .await
        .unwrap();
        alias_service::remove_address(&state, "alice2022", "telios.io", "shop")
            .await
            .unwrap();

        let outcome = save_messages(
            &state,
            IngestType::Incoming,
            vec![envelope("alice2022#shop@telios.io", "two")],
        )
        .await
        .unwrap();

        assert_eq!(outcome.new_aliases.len(), 1);
        let alias = aliases::get_alias(&state.pool, "alice2022#shop").unwrap().unwrap();
        // The recreated alias starts counting from scratch
        assert_eq!(alias.count, 1);
    }

    #[tokio::test]
    async fn test_disabled_alias_delivers_unaliased() {
        let (state, _relay) = test_state();
        alias_service::register_namespace(&state, 1, "alice2022").await.unwrap();
        save_messages(
            &state,
            IngestType::Incoming,
            vec![envelope("alice2022#shop@telios.io", "one")],
        )
        .await
        .unwrap();

        let params = alias_service::AddressParams {
            namespace_name: "alice2022".to_string(),
            domain: "telios.io".to_string(),
            address: "shop".to_string(),
            description: String::new(),
            fwd_addresses: vec![],
            disabled: true,
        };
        alias_service::update_address(&state, params).await.unwrap();

        let outcome = save_messages(
            &state,
            IngestType::Incoming,
            vec![envelope("alice2022#shop@telios.io", "two")],
        )
        .await
        .unwrap();

        assert!(outcome.msg_arr[0].alias_id.is_none());
        assert!(outcome.new_aliases.is_empty());
        let alias = aliases::get_alias(&state.pool, "alice2022#shop").unwrap().unwrap();
        assert_eq!(alias.count, 1);
    }

    #[tokio::test]
    async fn test_failed_count_bump_is_reported() {
        let (state, _relay) = test_state();
        alias_service::register_namespace(&state, 1, "alice2022").await.unwrap();
        save_messages(
            &state,
            IngestType::Incoming,
            vec![envelope("alice2022#shop@telios.io", "one")],
        )
        .await
        .unwrap();

        // Make every subsequent count update blow up at the store level
        state
            .pool
            .get()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER block_count_bump BEFORE UPDATE OF count ON aliases
                 BEGIN SELECT RAISE(ABORT, 'count locked'); END;",
            )
            .unwrap();

        let outcome = save_messages(
            &state,
            IngestType::Incoming,
            vec![envelope("alice2022#shop@telios.io", "two")],
        )
        .await
        .unwrap();

        // Delivery still succeeds, but the divergence is visible to callers
        assert_eq!(outcome.msg_arr.len(), 1);
        assert_eq!(outcome.msg_arr[0].alias_id.as_deref(), Some("alice2022#shop"));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].email_id, outcome.msg_arr[0].email_id);
        assert!(outcome.failures[0].error.contains("count"));

        let alias = aliases::get_alias(&state.pool, "alice2022#shop").unwrap().unwrap();
        assert_eq!(alias.count, 1);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_ids() {
        let (state, _relay) = test_state();

        let mut with_id = envelope("bob@telios.io", "pinned id");
        with_id.email_id = Some("pinned-0001".to_string());
        let outcome = save_messages(
            &state,
            IngestType::Incoming,
            vec![with_id, envelope("bob@telios.io", "minted id")],
        )
        .await
        .unwrap();

        assert_eq!(outcome.msg_arr[0].email_id, "pinned-0001");
        assert_eq!(outcome.msg_arr[0].subject, "pinned id");
        assert!(!outcome.msg_arr[1].email_id.is_empty());
        assert_ne!(outcome.msg_arr[1].email_id, "pinned-0001");
    }
}
