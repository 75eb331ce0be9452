//! Dispatch of decoded RPC calls onto the actor gateway.

use std::sync::Arc;

use capa_core::{
    ActorGateway, ActorReference, GatewayError, InvokeEnvelope, InvokeResponse, MetadataMap,
    MetadataRegistry, ReminderSpec, ShutdownHandle, TimerSpec, TransactionalOperation,
};
use serde_json::Value;
use tracing::debug;

use crate::messages::{
    ActiveActors, ActorReminder, ExecuteActorStateTransactionRequest, InvokeActorReply,
    InvokeActorRequest, MetadataReply, RegisterActorReminderRequest, RegisterActorTimerRequest,
    RpcCall, RpcReply, RpcRequest, RpcResponse, RpcStatus, TransactionalActorStateOperation,
};

type CallResult = Result<RpcReply, GatewayError>;

/// Handles one request at a time; shared by every connection.
pub struct RpcService {
    app_id: Arc<str>,
    gateway: Arc<ActorGateway>,
    registry: Arc<MetadataRegistry>,
    shutdown: ShutdownHandle,
}

impl RpcService {
    pub fn new(
        app_id: impl Into<Arc<str>>,
        gateway: Arc<ActorGateway>,
        registry: Arc<MetadataRegistry>,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            gateway,
            registry,
            shutdown,
        }
    }

    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest { id, metadata, call } = request;
        let name = call.name();
        match self.dispatch(call, metadata).await {
            Ok(reply) => RpcResponse::ok(id, reply),
            Err(err) => {
                debug!(id, call = name, error = %err, "rpc call failed");
                RpcResponse::error(id, RpcStatus::from_gateway_error(&err))
            }
        }
    }

    async fn dispatch(&self, call: RpcCall, metadata: MetadataMap) -> CallResult {
        match call {
            RpcCall::RegisterActorTimer(req) => self.register_timer(req).await,
            RpcCall::UnregisterActorTimer(req) => {
                let actor = ActorReference::new(req.actor_type, req.actor_id);
                self.gateway.delete_timer(&actor, &req.name).await?;
                Ok(RpcReply::Empty)
            }
            RpcCall::RegisterActorReminder(req) => self.register_reminder(req).await,
            RpcCall::UnregisterActorReminder(req) => {
                let actor = ActorReference::new(req.actor_type, req.actor_id);
                self.gateway.delete_reminder(&actor, &req.name).await?;
                Ok(RpcReply::Empty)
            }
            RpcCall::RenameActorReminder(req) => {
                let actor = ActorReference::new(req.actor_type, req.actor_id);
                self.gateway
                    .rename_reminder(&actor, &req.old_name, &req.new_name)
                    .await?;
                Ok(RpcReply::Empty)
            }
            RpcCall::GetActorReminder(req) => {
                let actor = ActorReference::new(req.actor_type, req.actor_id);
                let reminder = self.gateway.get_reminder(&actor, &req.name).await?;
                Ok(RpcReply::ActorReminder(reminder.map(to_reply_reminder)))
            }
            RpcCall::GetActorState(req) => {
                let actor = ActorReference::new(req.actor_type, req.actor_id);
                let data = self.gateway.get_state(&actor, &req.key).await?;
                Ok(RpcReply::ActorState {
                    data: data.unwrap_or_default(),
                })
            }
            RpcCall::ExecuteActorStateTransaction(req) => self.execute_transaction(req).await,
            RpcCall::InvokeActor(req) => self.invoke(req, metadata).await,
            RpcCall::GetMetadata => Ok(self.metadata().await),
            RpcCall::SetMetadata(req) => {
                self.registry.set(req.key, req.value);
                Ok(RpcReply::Empty)
            }
            RpcCall::Shutdown => {
                self.shutdown.request();
                Ok(RpcReply::Empty)
            }
        }
    }

    async fn register_timer(&self, req: RegisterActorTimerRequest) -> CallResult {
        self.gateway.ensure_runtime()?;
        let actor = ActorReference::new(req.actor_type, req.actor_id);
        let timer = TimerSpec {
            due_time: req.due_time,
            period: req.period,
            ttl: non_empty(req.ttl),
            callback: non_empty(req.callback),
            data: decode_json(&req.data)?,
            ..TimerSpec::default()
        };
        self.gateway.create_timer(&actor, &req.name, timer).await?;
        Ok(RpcReply::Empty)
    }

    async fn register_reminder(&self, req: RegisterActorReminderRequest) -> CallResult {
        self.gateway.ensure_runtime()?;
        let actor = ActorReference::new(req.actor_type, req.actor_id);
        let reminder = ReminderSpec {
            due_time: req.due_time,
            period: req.period,
            ttl: non_empty(req.ttl),
            data: decode_json(&req.data)?,
            ..ReminderSpec::default()
        };
        self.gateway
            .create_reminder(&actor, &req.name, reminder)
            .await?;
        Ok(RpcReply::Empty)
    }

    async fn execute_transaction(&self, req: ExecuteActorStateTransactionRequest) -> CallResult {
        self.gateway.ensure_runtime()?;
        let actor = ActorReference::new(req.actor_type, req.actor_id);
        let operations = req
            .operations
            .into_iter()
            .map(to_operation)
            .collect::<Result<Vec<_>, _>>()?;
        self.gateway
            .execute_state_transaction(&actor, operations)
            .await?;
        Ok(RpcReply::Empty)
    }

    async fn invoke(&self, req: InvokeActorRequest, metadata: MetadataMap) -> CallResult {
        let actor = ActorReference::new(req.actor_type, req.actor_id);
        let envelope = InvokeEnvelope::new(req.method)
            .with_raw_data(req.data, req.content_type)
            .with_metadata(metadata);
        let ctx = self.shutdown.child_token();
        let response = self.gateway.invoke_actor(&ctx, &actor, envelope).await?;
        Ok(RpcReply::InvokeActor(to_invoke_reply(response)))
    }

    async fn metadata(&self) -> RpcReply {
        let actors = self
            .gateway
            .active_actors_count()
            .await
            .into_iter()
            .map(|active| ActiveActors {
                actor_type: active.actor_type,
                count: u64::try_from(active.count).unwrap_or(u64::MAX),
            })
            .collect();
        RpcReply::Metadata(MetadataReply {
            id: self.app_id.to_string(),
            actors,
            extended: self.registry.snapshot(),
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

/// Empty bytes decode to `None`.
fn decode_json(bytes: &[u8]) -> Result<Option<Value>, GatewayError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(GatewayError::malformed_request)
}

fn to_operation(op: TransactionalActorStateOperation) -> Result<TransactionalOperation, GatewayError> {
    match op.operation_type.as_str() {
        "upsert" => Ok(TransactionalOperation::Upsert {
            key: op.key,
            value: decode_json(&op.value)?.unwrap_or(Value::Null),
        }),
        "delete" => Ok(TransactionalOperation::Delete { key: op.key }),
        other => Err(GatewayError::malformed_request(format_args!(
            "unknown operation type {other:?}"
        ))),
    }
}

fn to_reply_reminder(spec: ReminderSpec) -> ActorReminder {
    let data = spec
        .data
        .as_ref()
        .and_then(|value| serde_json::to_vec(value).ok())
        .unwrap_or_default();
    ActorReminder {
        actor_type: spec.actor_type,
        actor_id: spec.actor_id,
        name: spec.name,
        due_time: spec.due_time,
        period: spec.period,
        ttl: spec.ttl.unwrap_or_default(),
        data,
    }
}

fn to_invoke_reply(response: InvokeResponse) -> InvokeActorReply {
    InvokeActorReply {
        data: response.data,
        content_type: response.content_type.unwrap_or_default(),
        headers: response.headers,
        status_code: response.status.code,
        status_is_http: response.status.http,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capa_core::testing::{RuntimeOp, ScriptedRuntime};
    use capa_core::{ErrorCode, Resiliency};

    fn service(runtime: Option<Arc<ScriptedRuntime>>) -> RpcService {
        let resiliency = Arc::new(Resiliency::disabled());
        let gateway = match runtime {
            Some(runtime) => ActorGateway::with_runtime(resiliency, runtime),
            None => ActorGateway::new(resiliency),
        };
        RpcService::new(
            "orders",
            Arc::new(gateway),
            Arc::new(MetadataRegistry::new()),
            ShutdownHandle::new(),
        )
    }

    fn request(call: RpcCall) -> RpcRequest {
        RpcRequest {
            id: 1,
            metadata: MetadataMap::new(),
            call,
        }
    }

    fn error_code(response: &RpcResponse) -> Option<&str> {
        response
            .outcome
            .as_ref()
            .err()
            .map(|status| status.error_code.as_str())
    }

    #[tokio::test]
    async fn test_missing_runtime_wins_over_bad_json() {
        let service = service(None);
        let response = service
            .handle(request(RpcCall::RegisterActorReminder(
                RegisterActorReminderRequest {
                    data: b"{not json".to_vec(),
                    ..RegisterActorReminderRequest::default()
                },
            )))
            .await;
        assert_eq!(response.id, 1);
        assert_eq!(error_code(&response), Some("ERR_ACTOR_RUNTIME_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_bad_json_is_malformed_and_skips_runtime() {
        let runtime = Arc::new(ScriptedRuntime::new().hosted());
        let service = service(Some(Arc::clone(&runtime)));
        let response = service
            .handle(request(RpcCall::RegisterActorTimer(
                RegisterActorTimerRequest {
                    data: b"{not json".to_vec(),
                    ..RegisterActorTimerRequest::default()
                },
            )))
            .await;
        assert_eq!(error_code(&response), Some(ErrorCode::MalformedRequest.as_str()));
        assert_eq!(runtime.calls(RuntimeOp::CreateTimer), 0);
    }

    #[tokio::test]
    async fn test_unknown_operation_type_is_malformed() {
        let runtime = Arc::new(ScriptedRuntime::new().hosted());
        let service = service(Some(Arc::clone(&runtime)));
        let response = service
            .handle(request(RpcCall::ExecuteActorStateTransaction(
                ExecuteActorStateTransactionRequest {
                    actor_type: "user".to_string(),
                    actor_id: "42".to_string(),
                    operations: vec![TransactionalActorStateOperation {
                        operation_type: "merge".to_string(),
                        key: "k".to_string(),
                        value: Vec::new(),
                    }],
                },
            )))
            .await;
        assert_eq!(error_code(&response), Some("ERR_MALFORMED_REQUEST"));
        assert_eq!(runtime.calls(RuntimeOp::Transaction), 0);
    }

    #[test]
    fn test_operation_conversion() -> Result<(), GatewayError> {
        let upsert = to_operation(TransactionalActorStateOperation {
            operation_type: "upsert".to_string(),
            key: "balance".to_string(),
            value: br#"{"amount":10}"#.to_vec(),
        })?;
        assert_eq!(
            upsert,
            TransactionalOperation::Upsert {
                key: "balance".to_string(),
                value: serde_json::json!({"amount": 10}),
            }
        );
        let delete = to_operation(TransactionalActorStateOperation {
            operation_type: "delete".to_string(),
            key: "stale".to_string(),
            value: b"ignored".to_vec(),
        })?;
        assert_eq!(delete.key(), "stale");
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_call_requests_shutdown() {
        let service = service(None);
        let response = service.handle(request(RpcCall::Shutdown)).await;
        assert_eq!(response.outcome, Ok(RpcReply::Empty));
        assert!(service.shutdown.is_requested());
    }
}
