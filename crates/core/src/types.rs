//! Request-scoped data model for actor operations.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Header or metadata map: name to every value received under that name.
pub type MetadataMap = HashMap<String, Vec<String>>;

/// Identity of an actor: `(actorType, actorId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorReference {
    pub actor_type: String,
    pub actor_id: String,
}

impl ActorReference {
    pub fn new(actor_type: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type: actor_type.into(),
            actor_id: actor_id.into(),
        }
    }
}

impl fmt::Display for ActorReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.actor_type, self.actor_id)
    }
}

/// Unique key of a reminder or timer: the owning actor plus a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleKey {
    pub actor: ActorReference,
    pub name: String,
}

impl ScheduleKey {
    pub fn new(actor: &ActorReference, name: impl Into<String>) -> Self {
        Self {
            actor: actor.clone(),
            name: name.into(),
        }
    }
}

/// A persisted reminder.
///
/// Decoded from the request body; the identity fields are always
/// overwritten from the request path before reaching the runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderSpec {
    pub name: String,
    pub actor_type: String,
    pub actor_id: String,
    pub due_time: String,
    pub period: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ReminderSpec {
    /// Bind the spec to the actor and name taken from the request path.
    #[must_use]
    pub fn bind(mut self, actor: &ActorReference, name: &str) -> Self {
        self.actor_type.clone_from(&actor.actor_type);
        self.actor_id.clone_from(&actor.actor_id);
        self.name = name.to_string();
        self
    }

    #[must_use]
    pub fn key(&self) -> ScheduleKey {
        ScheduleKey {
            actor: ActorReference::new(self.actor_type.clone(), self.actor_id.clone()),
            name: self.name.clone(),
        }
    }
}

/// A transient timer. Same identity rules as [`ReminderSpec`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerSpec {
    pub name: String,
    pub actor_type: String,
    pub actor_id: String,
    pub due_time: String,
    pub period: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TimerSpec {
    #[must_use]
    pub fn bind(mut self, actor: &ActorReference, name: &str) -> Self {
        self.actor_type.clone_from(&actor.actor_type);
        self.actor_id.clone_from(&actor.actor_id);
        self.name = name.to_string();
        self
    }

    #[must_use]
    pub fn key(&self) -> ScheduleKey {
        ScheduleKey {
            actor: ActorReference::new(self.actor_type.clone(), self.actor_id.clone()),
            name: self.name.clone(),
        }
    }
}

/// Body of a reminder rename request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameReminderBody {
    pub new_name: String,
}

/// One step of an actor state transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "request", rename_all = "lowercase")]
pub enum TransactionalOperation {
    Upsert {
        key: String,
        #[serde(default)]
        value: serde_json::Value,
    },
    Delete {
        key: String,
    },
}

impl TransactionalOperation {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Upsert { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// A direct method invocation on an actor.
///
/// The HTTP verb travels with the envelope on both transports so the
/// runtime sees the same request regardless of how it arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeEnvelope {
    pub method: String,
    pub verb: String,
    pub query: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub metadata: MetadataMap,
}

impl InvokeEnvelope {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            verb: "POST".to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_http_extension(mut self, verb: impl Into<String>, query: impl Into<String>) -> Self {
        self.verb = verb.into().to_uppercase();
        self.query = query.into();
        self
    }

    #[must_use]
    pub fn with_raw_data(mut self, data: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.data = data;
        self.content_type = content_type.into();
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Status attached to an invocation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeStatus {
    pub code: i32,
    /// `true` when `code` is already an HTTP status.
    pub http: bool,
}

impl InvokeStatus {
    #[must_use]
    pub const fn http(code: u16) -> Self {
        Self {
            code: code as i32,
            http: true,
        }
    }

    #[must_use]
    pub const fn canonical(code: crate::CanonicalCode) -> Self {
        Self {
            code: code.as_i32(),
            http: false,
        }
    }

    /// Status expressed as HTTP, translating canonical codes.
    #[must_use]
    pub fn to_http(self) -> u16 {
        if self.http {
            u16::try_from(self.code).unwrap_or(500)
        } else {
            crate::status::http_status_from_code(self.code)
        }
    }
}

/// Result of a direct invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeResponse {
    pub status: InvokeStatus,
    pub headers: MetadataMap,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl InvokeResponse {
    #[must_use]
    pub fn ok(data: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            status: InvokeStatus::canonical(crate::CanonicalCode::Ok),
            headers: MetadataMap::new(),
            content_type,
            data,
        }
    }
}

/// Number of active actors of one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveActorsCount {
    #[serde(rename = "type")]
    pub actor_type: String,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reminder_body_decodes_with_defaults() -> Result<(), serde_json::Error> {
        let spec: ReminderSpec = serde_json::from_str(r#"{"dueTime":"5s"}"#)?;
        assert_eq!(spec.due_time, "5s");
        assert!(spec.period.is_empty());
        assert!(spec.data.is_none());
        Ok(())
    }

    #[test]
    fn test_reminder_bind_overwrites_identity() -> Result<(), serde_json::Error> {
        let spec: ReminderSpec =
            serde_json::from_str(r#"{"name":"spoofed","actorType":"other","dueTime":"1m"}"#)?;
        let actor = ActorReference::new("user", "42");
        let bound = spec.bind(&actor, "wakeup");
        assert_eq!(bound.name, "wakeup");
        assert_eq!(bound.actor_type, "user");
        assert_eq!(bound.actor_id, "42");
        assert_eq!(bound.key(), ScheduleKey::new(&actor, "wakeup"));
        Ok(())
    }

    #[test]
    fn test_reminder_rejects_non_json() {
        let result: Result<ReminderSpec, _> = serde_json::from_slice(b"not-json");
        assert!(result.is_err());
    }

    #[test]
    fn test_transaction_operations_decode() -> Result<(), serde_json::Error> {
        let ops: Vec<TransactionalOperation> = serde_json::from_str(
            r#"[
                {"operation":"upsert","request":{"key":"balance","value":{"amount":10}}},
                {"operation":"delete","request":{"key":"stale"}}
            ]"#,
        )?;
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops.first(),
            Some(&TransactionalOperation::Upsert {
                key: "balance".to_string(),
                value: serde_json::json!({"amount": 10}),
            })
        );
        assert_eq!(ops.get(1).map(TransactionalOperation::key), Some("stale"));
        Ok(())
    }

    #[test]
    fn test_unknown_transaction_operation_rejected() {
        let result: Result<Vec<TransactionalOperation>, _> =
            serde_json::from_str(r#"[{"operation":"merge","request":{"key":"k"}}]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_invoke_status_translation() {
        assert_eq!(InvokeStatus::http(202).to_http(), 202);
        assert_eq!(
            InvokeStatus::canonical(crate::CanonicalCode::NotFound).to_http(),
            404
        );
        assert_eq!(
            InvokeStatus {
                code: -5,
                http: true
            }
            .to_http(),
            500
        );
    }

    #[test]
    fn test_envelope_uppercases_verb() {
        let envelope = InvokeEnvelope::new("deposit").with_http_extension("put", "a=1");
        assert_eq!(envelope.verb, "PUT");
        assert_eq!(envelope.query, "a=1");
    }
}
