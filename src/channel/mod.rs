//! Request/response channel surface
//!
//! Events use the `domain:operation` naming of the wire protocol
//! (`alias:registerAliasAddress`, `email:saveMessageToDB`, ...). Every
//! response echoes the request event suffixed `:success` or `:error`;
//! failures cross the channel as structured records, never as raw errors
//! or panics.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::services::{alias_service, ingest, message_service};
use crate::state::AppState;
use crate::types::error::{MaskboxError, Result};
use crate::types::{EmailEnvelope, IngestType, MoveMessageRequest};

/// An incoming channel request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

/// Wire form of a failed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub name: String,
    pub message: String,
    pub stacktrace: String,
}

/// A channel response: `<event>:success` with data, or `<event>:error`
/// with an [`ErrorRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl Response {
    pub fn success(event: &str, data: Value) -> Self {
        Self {
            event: format!("{event}:success"),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(event: &str, err: &MaskboxError) -> Self {
        Self {
            event: format!("{event}:error"),
            data: None,
            error: Some(ErrorRecord {
                name: err.name().to_string(),
                message: err.to_string(),
                // No native backtrace crosses the wire; the field exists
                // for protocol compatibility.
                stacktrace: String::new(),
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterNamespacePayload {
    mailbox_id: i64,
    namespace: String,
}

#[derive(Deserialize)]
struct MailboxPayload {
    #[serde(alias = "mailboxId")]
    id: i64,
}

#[derive(Deserialize)]
struct MessageIdPayload {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceKeysPayload {
    namespace_keys: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveAddressPayload {
    namespace_name: String,
    domain: String,
    address: String,
}

#[derive(Deserialize)]
struct UpdateCountPayload {
    id: String,
    amount: i64,
}

#[derive(Deserialize)]
struct SaveMessagesPayload {
    #[serde(rename = "type")]
    kind: IngestType,
    messages: Vec<EmailEnvelope>,
}

#[derive(Deserialize)]
struct MoveMessagesPayload {
    messages: Vec<MoveMessageRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveMessagesPayload {
    message_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPayload {
    search_query: String,
}

fn parse_payload<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| MaskboxError::Validation(format!("invalid payload: {e}")))
}

fn to_data<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| MaskboxError::Channel(e.to_string()))
}

/// Route one request to its handler and fold the outcome into a response.
pub async fn dispatch(state: &AppState, request: Request) -> Response {
    debug!("Channel request: {}", request.event);
    let event = request.event.clone();
    match handle(state, request).await {
        Ok(data) => Response::success(&event, data),
        Err(err) => {
            error!("Channel request {event} failed: {err}");
            Response::failure(&event, &err)
        }
    }
}

async fn handle(state: &AppState, request: Request) -> Result<Value> {
    match request.event.as_str() {
        "alias:registerAliasNamespace" => {
            let p: RegisterNamespacePayload = parse_payload(request.payload)?;
            let ns = alias_service::register_namespace(state, p.mailbox_id, &p.namespace).await?;
            to_data(&ns)
        }
        "alias:getMailboxNamespaces" => {
            let p: MailboxPayload = parse_payload(request.payload)?;
            to_data(&alias_service::get_mailbox_namespaces(state, p.id)?)
        }
        "alias:registerAliasAddress" => {
            let params: alias_service::AddressParams = parse_payload(request.payload)?;
            to_data(&alias_service::register_address(state, params).await?)
        }
        "alias:getMailboxAliases" => {
            let p: NamespaceKeysPayload = parse_payload(request.payload)?;
            to_data(&alias_service::get_mailbox_aliases(state, &p.namespace_keys)?)
        }
        "alias:updateAliasAddress" => {
            let params: alias_service::AddressParams = parse_payload(request.payload)?;
            alias_service::update_address(state, params).await?;
            Ok(Value::Null)
        }
        "alias:removeAliasAddress" => {
            let p: RemoveAddressPayload = parse_payload(request.payload)?;
            alias_service::remove_address(state, &p.namespace_name, &p.domain, &p.address).await?;
            Ok(Value::Null)
        }
        "alias:updateAliasCount" => {
            let p: UpdateCountPayload = parse_payload(request.payload)?;
            let updated = alias_service::update_alias_count(state, &p.id, p.amount)?;
            Ok(Value::Bool(updated))
        }
        "email:saveMessageToDB" => {
            let p: SaveMessagesPayload = parse_payload(request.payload)?;
            to_data(&ingest::save_messages(state, p.kind, p.messages).await?)
        }
        "email:getMessagesByFolderId" => {
            let p: MailboxPayload = parse_payload(request.payload)?;
            to_data(&message_service::get_messages_by_folder_id(state, p.id)?)
        }
        "email:getMessagesByAliasId" => {
            let p: MessageIdPayload = parse_payload(request.payload)?;
            to_data(&message_service::get_messages_by_alias_id(state, &p.id)?)
        }
        "email:getMessageById" => {
            let p: MessageIdPayload = parse_payload(request.payload)?;
            to_data(&message_service::get_message_by_id(state, &p.id)?)
        }
        "email:moveMessages" => {
            let p: MoveMessagesPayload = parse_payload(request.payload)?;
            message_service::move_messages(state, &p.messages)?;
            Ok(Value::Null)
        }
        "email:markAsUnread" => {
            let p: MessageIdPayload = parse_payload(request.payload)?;
            message_service::mark_as_unread(state, &p.id)?;
            Ok(Value::Null)
        }
        "email:removeMessages" => {
            let p: RemoveMessagesPayload = parse_payload(request.payload)?;
            let removed = message_service::remove_messages(state, &p.message_ids)?;
            Ok(json!({ "removed": removed }))
        }
        "email:searchMailbox" => {
            let p: SearchPayload = parse_payload(request.payload)?;
            to_data(&message_service::search_mailbox(state, &p.search_query)?)
        }
        other => Err(MaskboxError::Channel(format!("unknown event '{other}'"))),
    }
}

/// Serve requests from a flume channel until the sender side closes.
pub async fn run_worker(
    state: AppState,
    requests: flume::Receiver<Request>,
    responses: flume::Sender<Response>,
) {
    while let Ok(request) = requests.recv_async().await {
        let response = dispatch(&state, request).await;
        if responses.send_async(response).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::in_memory_pool;
    use crate::relay::mock::MockRelay;
    use crate::state::{AccountContext, AppState};
    use std::sync::Arc;

    fn test_state() -> AppState {
        AppState::new(
            in_memory_pool().unwrap(),
            Arc::new(MockRelay::new()),
            AccountContext {
                mailbox_id: 1,
                mail_domain: "telios.io".to_string(),
                secret_box_priv_key: "test-root-secret".to_string(),
            },
        )
    }

    fn request(event: &str, payload: Value) -> Request {
        Request {
            event: event.to_string(),
            payload,
        }
    }

    #[tokio::test]
    async fn test_register_and_list_namespaces() {
        let state = test_state();

        let resp = dispatch(
            &state,
            request(
                "alias:registerAliasNamespace",
                json!({ "mailboxId": 1, "namespace": "alice2022" }),
            ),
        )
        .await;
        assert_eq!(resp.event, "alias:registerAliasNamespace:success");
        assert_eq!(resp.data.unwrap()["name"], "alice2022");

        let resp = dispatch(
            &state,
            request("alias:getMailboxNamespaces", json!({ "id": 1 })),
        )
        .await;
        assert_eq!(resp.event, "alias:getMailboxNamespaces:success");
        assert_eq!(resp.data.unwrap().as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_event_is_a_channel_error() {
        let state = test_state();
        let resp = dispatch(&state, request("alias:noSuchThing", Value::Null)).await;

        assert_eq!(resp.event, "alias:noSuchThing:error");
        let err = resp.error.unwrap();
        assert_eq!(err.name, "ChannelError");
        assert!(err.message.contains("noSuchThing"));
        assert!(err.stacktrace.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_a_validation_error() {
        let state = test_state();
        let resp = dispatch(
            &state,
            request("email:getMessageById", json!({ "wrong": true })),
        )
        .await;

        assert_eq!(resp.event, "email:getMessageById:error");
        assert_eq!(resp.error.unwrap().name, "ValidationError");
    }

    #[tokio::test]
    async fn test_save_and_search_round_trip() {
        let state = test_state();

        let resp = dispatch(
            &state,
            request(
                "email:saveMessageToDB",
                json!({
                    "type": "Incoming",
                    "messages": [{
                        "to": "me@telios.io",
                        "from": "sender@example.com",
                        "subject": "Quarterly numbers",
                        "bodyAsText": "the quick brown fox",
                        "unread": true
                    }]
                }),
            ),
        )
        .await;
        assert_eq!(resp.event, "email:saveMessageToDB:success");
        let data = resp.data.unwrap();
        assert_eq!(data["msgArr"].as_array().unwrap().len(), 1);
        assert!(data["newAliases"].as_array().unwrap().is_empty());

        let resp = dispatch(
            &state,
            request("email:searchMailbox", json!({ "searchQuery": "Quarterly" })),
        )
        .await;
        assert_eq!(resp.data.unwrap().as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_serves_until_closed() {
        let state = test_state();
        let (req_tx, req_rx) = flume::unbounded();
        let (resp_tx, resp_rx) = flume::unbounded();

        let worker = tokio::spawn(run_worker(state, req_rx, resp_tx));

        req_tx
            .send_async(request("alias:getMailboxNamespaces", json!({ "id": 1 })))
            .await
            .unwrap();
        let resp = resp_rx.recv_async().await.unwrap();
        assert_eq!(resp.event, "alias:getMailboxNamespaces:success");

        drop(req_tx);
        worker.await.unwrap();
    }
}
