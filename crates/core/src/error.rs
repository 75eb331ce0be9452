//! Error taxonomy shared by both protocol adapters.
//!
//! Every failure a client can observe is a [`GatewayError`]: a closed
//! [`ErrorCode`] plus a human-readable message. Adapters only translate the
//! code into a transport status; they never mint codes of their own.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of client-visible error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "ERR_ACTOR_RUNTIME_NOT_FOUND")]
    ActorRuntimeNotFound,
    #[serde(rename = "ERR_MALFORMED_REQUEST")]
    MalformedRequest,
    #[serde(rename = "ERR_ACTOR_INSTANCE_MISSING")]
    ActorInstanceMissing,
    #[serde(rename = "ERR_ACTOR_REMINDER_CREATE")]
    ActorReminderCreate,
    #[serde(rename = "ERR_ACTOR_REMINDER_GET")]
    ActorReminderGet,
    #[serde(rename = "ERR_ACTOR_REMINDER_DELETE")]
    ActorReminderDelete,
    #[serde(rename = "ERR_ACTOR_REMINDER_RENAME")]
    ActorReminderRename,
    #[serde(rename = "ERR_ACTOR_TIMER_CREATE")]
    ActorTimerCreate,
    #[serde(rename = "ERR_ACTOR_TIMER_DELETE")]
    ActorTimerDelete,
    #[serde(rename = "ERR_ACTOR_STATE_TRANSACTION_SAVE")]
    ActorStateTransactionSave,
    #[serde(rename = "ERR_ACTOR_STATE_GET")]
    ActorStateGet,
    #[serde(rename = "ERR_ACTOR_INVOKE_METHOD")]
    ActorInvokeMethod,
    #[serde(rename = "ERR_METADATA_GET")]
    MetadataGet,
    #[serde(rename = "ERR_HEALTH_NOT_READY")]
    HealthNotReady,
}

impl ErrorCode {
    /// Wire representation of the code, e.g. `ERR_MALFORMED_REQUEST`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ActorRuntimeNotFound => "ERR_ACTOR_RUNTIME_NOT_FOUND",
            Self::MalformedRequest => "ERR_MALFORMED_REQUEST",
            Self::ActorInstanceMissing => "ERR_ACTOR_INSTANCE_MISSING",
            Self::ActorReminderCreate => "ERR_ACTOR_REMINDER_CREATE",
            Self::ActorReminderGet => "ERR_ACTOR_REMINDER_GET",
            Self::ActorReminderDelete => "ERR_ACTOR_REMINDER_DELETE",
            Self::ActorReminderRename => "ERR_ACTOR_REMINDER_RENAME",
            Self::ActorTimerCreate => "ERR_ACTOR_TIMER_CREATE",
            Self::ActorTimerDelete => "ERR_ACTOR_TIMER_DELETE",
            Self::ActorStateTransactionSave => "ERR_ACTOR_STATE_TRANSACTION_SAVE",
            Self::ActorStateGet => "ERR_ACTOR_STATE_GET",
            Self::ActorInvokeMethod => "ERR_ACTOR_INVOKE_METHOD",
            Self::MetadataGet => "ERR_METADATA_GET",
            Self::HealthNotReady => "ERR_HEALTH_NOT_READY",
        }
    }

    /// Whether the failure was caused by the request itself rather than the
    /// sidecar or its runtime.
    #[must_use]
    pub const fn is_client_error(self) -> bool {
        matches!(self, Self::MalformedRequest | Self::ActorInstanceMissing)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, client-visible gateway failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn runtime_not_found() -> Self {
        Self::new(
            ErrorCode::ActorRuntimeNotFound,
            "actor runtime is not configured",
        )
    }

    pub fn malformed_request(reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::MalformedRequest,
            format!("failed deserializing request body: {reason}"),
        )
    }

    #[must_use]
    pub fn instance_missing() -> Self {
        Self::new(ErrorCode::ActorInstanceMissing, "actor instance is missing")
    }

    pub fn reminder_create(err: &RuntimeError) -> Self {
        Self::new(
            ErrorCode::ActorReminderCreate,
            format!("error creating actor reminder: {err}"),
        )
    }

    pub fn reminder_get(err: &RuntimeError) -> Self {
        Self::new(
            ErrorCode::ActorReminderGet,
            format!("error getting actor reminder: {err}"),
        )
    }

    pub fn reminder_delete(err: &RuntimeError) -> Self {
        Self::new(
            ErrorCode::ActorReminderDelete,
            format!("error deleting actor reminder: {err}"),
        )
    }

    pub fn reminder_rename(err: &RuntimeError) -> Self {
        Self::new(
            ErrorCode::ActorReminderRename,
            format!("error renaming actor reminder: {err}"),
        )
    }

    pub fn timer_create(err: &RuntimeError) -> Self {
        Self::new(
            ErrorCode::ActorTimerCreate,
            format!("error creating actor timer: {err}"),
        )
    }

    pub fn timer_delete(err: &RuntimeError) -> Self {
        Self::new(
            ErrorCode::ActorTimerDelete,
            format!("error deleting actor timer: {err}"),
        )
    }

    pub fn state_transaction_save(err: &RuntimeError) -> Self {
        Self::new(
            ErrorCode::ActorStateTransactionSave,
            format!("error saving actor transaction state: {err}"),
        )
    }

    pub fn state_get(err: &RuntimeError) -> Self {
        Self::new(
            ErrorCode::ActorStateGet,
            format!("error getting actor state: {err}"),
        )
    }

    pub fn invoke_method(err: &RuntimeError) -> Self {
        Self::new(
            ErrorCode::ActorInvokeMethod,
            format!("error invoking actor method: {err}"),
        )
    }

    pub fn metadata_get(reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::MetadataGet,
            format!("failed serializing metadata: {reason}"),
        )
    }

    #[must_use]
    pub fn health_not_ready() -> Self {
        Self::new(ErrorCode::HealthNotReady, "sidecar is not ready")
    }
}

/// Failure reported by an [`ActorRuntime`](crate::ActorRuntime) call.
///
/// The variants separate failures that happen before the runtime takes the
/// per-actor lock (safe to retry) from everything else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// No host could be resolved for the actor.
    #[error("failed to look up host for actor {actor}: {reason}")]
    HostLookup { actor: String, reason: String },

    /// Transient routing failure before the call reached the actor.
    #[error("actor host unavailable: {0}")]
    Unavailable(String),

    /// The runtime attempted the operation and it failed.
    #[error("{0}")]
    Failed(String),

    /// The runtime's actor subsystem has been stopped.
    #[error("actor runtime is stopped")]
    Stopped,

    /// The caller's context was cancelled before the call was attempted.
    #[error("operation cancelled")]
    Cancelled,
}

impl RuntimeError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Failures that occur before the actor lock is taken. Only these are
    /// eligible for retry.
    #[must_use]
    pub const fn is_pre_lock(&self) -> bool {
        matches!(self, Self::HostLookup { .. } | Self::Unavailable(_))
    }
}
