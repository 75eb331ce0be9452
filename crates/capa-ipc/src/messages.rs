//! RPC message types.
//!
//! Every request carries a caller-chosen `id` that the matching response
//! echoes, so responses may be written in completion order.
//!
//! Opaque values (reminder and timer data, state values, invocation bodies)
//! travel as JSON-encoded bytes. An empty byte string means "absent".

use std::collections::BTreeMap;

use capa_core::{CanonicalCode, ErrorCode, GatewayError, MetadataMap};
use serde::{Deserialize, Serialize};

/// A request frame sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    /// Caller metadata, forwarded to invocations as headers.
    pub metadata: MetadataMap,
    pub call: RpcCall,
}

/// Operation requested by an [`RpcRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcCall {
    RegisterActorTimer(RegisterActorTimerRequest),
    UnregisterActorTimer(UnregisterActorTimerRequest),
    RegisterActorReminder(RegisterActorReminderRequest),
    UnregisterActorReminder(UnregisterActorReminderRequest),
    RenameActorReminder(RenameActorReminderRequest),
    GetActorReminder(GetActorReminderRequest),
    GetActorState(GetActorStateRequest),
    ExecuteActorStateTransaction(ExecuteActorStateTransactionRequest),
    InvokeActor(InvokeActorRequest),
    GetMetadata,
    SetMetadata(SetMetadataRequest),
    Shutdown,
}

impl RpcCall {
    /// Name of the call, used in logs and client errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RegisterActorTimer(_) => "RegisterActorTimer",
            Self::UnregisterActorTimer(_) => "UnregisterActorTimer",
            Self::RegisterActorReminder(_) => "RegisterActorReminder",
            Self::UnregisterActorReminder(_) => "UnregisterActorReminder",
            Self::RenameActorReminder(_) => "RenameActorReminder",
            Self::GetActorReminder(_) => "GetActorReminder",
            Self::GetActorState(_) => "GetActorState",
            Self::ExecuteActorStateTransaction(_) => "ExecuteActorStateTransaction",
            Self::InvokeActor(_) => "InvokeActor",
            Self::GetMetadata => "GetMetadata",
            Self::SetMetadata(_) => "SetMetadata",
            Self::Shutdown => "Shutdown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterActorTimerRequest {
    pub actor_type: String,
    pub actor_id: String,
    pub name: String,
    pub due_time: String,
    pub period: String,
    pub ttl: String,
    pub callback: String,
    /// JSON bytes.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterActorTimerRequest {
    pub actor_type: String,
    pub actor_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterActorReminderRequest {
    pub actor_type: String,
    pub actor_id: String,
    pub name: String,
    pub due_time: String,
    pub period: String,
    pub ttl: String,
    /// JSON bytes.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterActorReminderRequest {
    pub actor_type: String,
    pub actor_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameActorReminderRequest {
    pub actor_type: String,
    pub actor_id: String,
    pub old_name: String,
    pub new_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetActorReminderRequest {
    pub actor_type: String,
    pub actor_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetActorStateRequest {
    pub actor_type: String,
    pub actor_id: String,
    pub key: String,
}

/// One step of a state transaction. `operation_type` is `upsert` or `delete`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionalActorStateOperation {
    pub operation_type: String,
    pub key: String,
    /// JSON bytes; ignored for deletes.
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteActorStateTransactionRequest {
    pub actor_type: String,
    pub actor_id: String,
    pub operations: Vec<TransactionalActorStateOperation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeActorRequest {
    pub actor_type: String,
    pub actor_id: String,
    pub method: String,
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMetadataRequest {
    pub key: String,
    pub value: String,
}

/// A response frame. `id` echoes the request, or is `0` when the request
/// frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub outcome: Result<RpcReply, RpcStatus>,
}

impl RpcResponse {
    #[must_use]
    pub const fn ok(id: u64, reply: RpcReply) -> Self {
        Self {
            id,
            outcome: Ok(reply),
        }
    }

    #[must_use]
    pub const fn error(id: u64, status: RpcStatus) -> Self {
        Self {
            id,
            outcome: Err(status),
        }
    }
}

/// Successful result payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcReply {
    Empty,
    /// `None` when the reminder does not exist.
    ActorReminder(Option<ActorReminder>),
    /// Empty `data` when the key holds nothing.
    ActorState { data: Vec<u8> },
    InvokeActor(InvokeActorReply),
    Metadata(MetadataReply),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorReminder {
    pub actor_type: String,
    pub actor_id: String,
    pub name: String,
    pub due_time: String,
    pub period: String,
    pub ttl: String,
    /// JSON bytes.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeActorReply {
    pub data: Vec<u8>,
    pub content_type: String,
    pub headers: MetadataMap,
    pub status_code: i32,
    /// `true` when `status_code` is an HTTP status rather than a canonical code.
    pub status_is_http: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataReply {
    pub id: String,
    pub actors: Vec<ActiveActors>,
    pub extended: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveActors {
    pub actor_type: String,
    pub count: u64,
}

/// Error status of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    /// Canonical status code, see [`CanonicalCode`].
    pub code: i32,
    /// `ERR_*` code, empty for transport-level failures.
    pub error_code: String,
    pub message: String,
}

impl RpcStatus {
    pub fn new(code: CanonicalCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.as_i32(),
            error_code: error_code.into(),
            message: message.into(),
        }
    }

    /// Request-caused failures are `InvalidArgument`, everything else `Internal`.
    #[must_use]
    pub fn from_gateway_error(err: &GatewayError) -> Self {
        let code = if err.code.is_client_error() {
            CanonicalCode::InvalidArgument
        } else {
            CanonicalCode::Internal
        };
        Self::new(code, err.code.as_str(), err.message.clone())
    }

    /// Status for a frame that could not be decoded.
    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        Self::from_gateway_error(&GatewayError::malformed_request(reason))
    }

    #[must_use]
    pub const fn canonical(&self) -> CanonicalCode {
        CanonicalCode::from_i32(self.code)
    }

    #[must_use]
    pub fn is(&self, code: ErrorCode) -> bool {
        self.error_code == code.as_str()
    }
}
