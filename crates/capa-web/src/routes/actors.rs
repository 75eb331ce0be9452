//! Actor endpoints under `/v1.0/actors/{actorType}/{actorId}`.
//!
//! - `POST|PUT  .../state` - execute a state transaction
//! - `GET       .../state/{key}` - read one state key
//! - `*         .../method/{method}` - invoke an actor method
//! - `POST|PUT|DELETE|GET|PATCH .../reminders/{name}` - reminders
//! - `POST|PUT|DELETE .../timers/{name}` - timers
//!
//! Every handler checks the runtime precondition before it looks at the
//! body, so a sidecar without a runtime answers
//! `ERR_ACTOR_RUNTIME_NOT_FOUND` whatever was sent.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Json, Response},
};
use capa_core::{
    ActorReference, GatewayError, InvokeEnvelope, ReminderSpec, RenameReminderBody, TimerSpec,
    TransactionalOperation,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::responses;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ActorPath {
    #[serde(rename = "actorType")]
    actor_type: String,
    #[serde(rename = "actorId")]
    actor_id: String,
}

/// Actor path plus a reminder or timer name.
#[derive(Debug, Deserialize)]
pub struct NamedPath {
    #[serde(rename = "actorType")]
    actor_type: String,
    #[serde(rename = "actorId")]
    actor_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct MethodPath {
    #[serde(rename = "actorType")]
    actor_type: String,
    #[serde(rename = "actorId")]
    actor_id: String,
    method: String,
}

#[derive(Debug, Deserialize)]
pub struct StateKeyPath {
    #[serde(rename = "actorType")]
    actor_type: String,
    #[serde(rename = "actorId")]
    actor_id: String,
    key: String,
}

macro_rules! impl_actor {
    ($($path:ty),+) => {
        $(impl $path {
            fn actor(&self) -> ActorReference {
                ActorReference::new(self.actor_type.clone(), self.actor_id.clone())
            }
        })+
    };
}

impl_actor!(ActorPath, NamedPath, MethodPath, StateKeyPath);

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| GatewayError::malformed_request(e).into())
}

/// POST|PUT /v1.0/actors/{actorType}/{actorId}/state
pub async fn state_transaction(
    State(state): State<AppState>,
    Path(path): Path<ActorPath>,
    body: Bytes,
) -> Result<StatusCode> {
    state.gateway.ensure_runtime()?;
    let operations: Vec<TransactionalOperation> = decode(&body)?;
    state
        .gateway
        .execute_state_transaction(&path.actor(), operations)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1.0/actors/{actorType}/{actorId}/state/{key}
pub async fn get_state(
    State(state): State<AppState>,
    Path(path): Path<StateKeyPath>,
) -> Result<Response> {
    let data = state
        .gateway
        .get_state(&path.actor(), &path.key)
        .await?;
    Ok(data.map_or_else(responses::empty, |bytes| {
        responses::json(StatusCode::OK, bytes)
    }))
}

/// GET|POST|PUT|DELETE /v1.0/actors/{actorType}/{actorId}/method/{method}
pub async fn invoke_method(
    State(state): State<AppState>,
    Path(path): Path<MethodPath>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    state.gateway.ensure_runtime()?;

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let actor = path.actor();
    let envelope = InvokeEnvelope::new(path.method)
        .with_http_extension(method.as_str(), query.unwrap_or_default())
        .with_raw_data(body.to_vec(), content_type)
        .with_metadata(responses::headers_to_metadata(&headers));

    let ctx = state.shutdown.child_token();
    let result = state
        .gateway
        .invoke_actor(&ctx, &actor, envelope)
        .await?;
    Ok(responses::invoke(result))
}

/// POST|PUT /v1.0/actors/{actorType}/{actorId}/reminders/{name}
pub async fn create_reminder(
    State(state): State<AppState>,
    Path(path): Path<NamedPath>,
    body: Bytes,
) -> Result<StatusCode> {
    state.gateway.ensure_runtime()?;
    let reminder: ReminderSpec = decode(&body)?;
    state
        .gateway
        .create_reminder(&path.actor(), &path.name, reminder)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /v1.0/actors/{actorType}/{actorId}/reminders/{name}
pub async fn rename_reminder(
    State(state): State<AppState>,
    Path(path): Path<NamedPath>,
    body: Bytes,
) -> Result<StatusCode> {
    state.gateway.ensure_runtime()?;
    let rename: RenameReminderBody = decode(&body)?;
    state
        .gateway
        .rename_reminder(&path.actor(), &path.name, &rename.new_name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1.0/actors/{actorType}/{actorId}/reminders/{name}
pub async fn delete_reminder(
    State(state): State<AppState>,
    Path(path): Path<NamedPath>,
) -> Result<StatusCode> {
    state
        .gateway
        .delete_reminder(&path.actor(), &path.name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1.0/actors/{actorType}/{actorId}/reminders/{name}
///
/// 204 when the reminder does not exist.
pub async fn get_reminder(
    State(state): State<AppState>,
    Path(path): Path<NamedPath>,
) -> Result<Response> {
    let reminder = state
        .gateway
        .get_reminder(&path.actor(), &path.name)
        .await?;
    Ok(reminder.map_or_else(responses::empty, |r| Json(r).into_response()))
}

/// POST|PUT /v1.0/actors/{actorType}/{actorId}/timers/{name}
pub async fn create_timer(
    State(state): State<AppState>,
    Path(path): Path<NamedPath>,
    body: Bytes,
) -> Result<StatusCode> {
    state.gateway.ensure_runtime()?;
    let timer: TimerSpec = decode(&body)?;
    state
        .gateway
        .create_timer(&path.actor(), &path.name, timer)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1.0/actors/{actorType}/{actorId}/timers/{name}
pub async fn delete_timer(
    State(state): State<AppState>,
    Path(path): Path<NamedPath>,
) -> Result<StatusCode> {
    state
        .gateway
        .delete_timer(&path.actor(), &path.name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
