//! Actor endpoint tests
//!
//! Drives the internal router with `oneshot` against a scripted runtime.

#![forbid(unsafe_code)]
#![allow(clippy::expect_used)] // Tests are allowed to use expect

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use capa_core::testing::{RuntimeOp, ScriptedRuntime};
use capa_core::{
    ActorGateway, ActorReference, CanonicalCode, InvokeResponse, InvokeStatus, MetadataMap,
    MetadataRegistry, Resiliency, ResiliencyConfig, RetryPolicy, RuntimeError, ShutdownHandle,
    TransactionalOperation,
};
use capa_web::{AppState, create_router};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

struct Harness {
    router: Router,
    runtime: Arc<ScriptedRuntime>,
}

fn harness(runtime: ScriptedRuntime) -> Harness {
    harness_with(runtime, Resiliency::disabled())
}

fn harness_with(runtime: ScriptedRuntime, resiliency: Resiliency) -> Harness {
    let runtime = Arc::new(runtime);
    let gateway = ActorGateway::with_runtime(Arc::new(resiliency), runtime.clone());
    let state = AppState::new(
        "capa",
        Arc::new(gateway),
        Arc::new(MetadataRegistry::new()),
        ShutdownHandle::new(),
    );
    Harness {
        router: create_router(state),
        runtime,
    }
}

fn no_runtime_router() -> Router {
    let state = AppState::new(
        "capa",
        Arc::new(ActorGateway::new(Arc::new(Resiliency::disabled()))),
        Arc::new(MetadataRegistry::new()),
        ShutdownHandle::new(),
    );
    create_router(state)
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, Vec<(String, String)>, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(Body::from(body.to_string()))
        .expect("Failed to build request");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("Request failed");

    let status = response.status();
    let response_headers = response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect body")
        .to_bytes()
        .to_vec();
    (status, response_headers, bytes)
}

fn error_code(body: &[u8]) -> String {
    let json: Value = serde_json::from_slice(body).expect("Failed to parse error body");
    json.get("errorCode")
        .and_then(Value::as_str)
        .expect("errorCode missing")
        .to_string()
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

#[tokio::test]
async fn test_reminder_without_runtime_then_malformed_body() {
    let router = no_runtime_router();
    let (status, _, body) = send(
        &router,
        Method::POST,
        "/v1.0/actors/user/42/reminders/wakeup",
        r#"{"dueTime":"5s"}"#,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&body), "ERR_ACTOR_RUNTIME_NOT_FOUND");

    let h = harness(ScriptedRuntime::new());
    let (status, _, body) = send(
        &h.router,
        Method::POST,
        "/v1.0/actors/user/42/reminders/wakeup",
        "not-json",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "ERR_MALFORMED_REQUEST");
    assert_eq!(h.runtime.backend_calls(), 0);
}

#[tokio::test]
async fn test_runtime_check_precedes_body_decoding() {
    let router = no_runtime_router();
    for (method, uri) in [
        (Method::PUT, "/v1.0/actors/user/42/timers/tick"),
        (Method::PATCH, "/v1.0/actors/user/42/reminders/wakeup"),
        (Method::POST, "/v1.0/actors/user/42/state"),
        (Method::POST, "/v1.0/actors/user/42/method/ping"),
    ] {
        let (status, _, body) = send(&router, method, uri, "not-json", &[]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_code(&body), "ERR_ACTOR_RUNTIME_NOT_FOUND");
    }
}

#[tokio::test]
async fn test_create_reminder_binds_path_identity() {
    let h = harness(ScriptedRuntime::new());
    let (status, _, body) = send(
        &h.router,
        Method::PUT,
        "/v1.0/actors/user/42/reminders/wakeup",
        r#"{"name":"other","dueTime":"5s","period":"1m","data":{"a":1}}"#,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let stored = h
        .runtime
        .reminder(&ActorReference::new("user", "42"), "wakeup")
        .expect("reminder stored under path name");
    assert_eq!(stored.due_time, "5s");
    assert_eq!(stored.period, "1m");
    assert_eq!(stored.data, Some(serde_json::json!({"a": 1})));
}

#[tokio::test]
async fn test_get_reminder_found_and_missing() {
    let h = harness(ScriptedRuntime::new());
    send(
        &h.router,
        Method::POST,
        "/v1.0/actors/user/42/reminders/wakeup",
        r#"{"dueTime":"5s"}"#,
        &[],
    )
    .await;

    let (status, headers, body) = send(
        &h.router,
        Method::GET,
        "/v1.0/actors/user/42/reminders/wakeup",
        "",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&headers, "content-type"), Some("application/json"));
    let json: Value = serde_json::from_slice(&body).expect("reminder json");
    assert_eq!(json.get("dueTime"), Some(&Value::from("5s")));
    assert_eq!(json.get("actorType"), Some(&Value::from("user")));

    let (status, _, _) = send(
        &h.router,
        Method::GET,
        "/v1.0/actors/user/42/reminders/missing",
        "",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_rename_and_delete_reminder() {
    let h = harness(ScriptedRuntime::new());
    let actor = ActorReference::new("user", "42");
    send(
        &h.router,
        Method::POST,
        "/v1.0/actors/user/42/reminders/old",
        r#"{"dueTime":"5s"}"#,
        &[],
    )
    .await;

    let (status, _, _) = send(
        &h.router,
        Method::PATCH,
        "/v1.0/actors/user/42/reminders/old",
        r#"{"newName":"new"}"#,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(h.runtime.reminder(&actor, "old").is_none());
    assert!(h.runtime.reminder(&actor, "new").is_some());

    let (status, _, _) = send(
        &h.router,
        Method::DELETE,
        "/v1.0/actors/user/42/reminders/new",
        "",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(h.runtime.reminder(&actor, "new").is_none());
}

#[tokio::test]
async fn test_reminder_runtime_failure_is_internal_error() {
    let h = harness(
        ScriptedRuntime::new()
            .failing(RuntimeOp::DeleteReminder, RuntimeError::failed("store down")),
    );
    let (status, _, body) = send(
        &h.router,
        Method::DELETE,
        "/v1.0/actors/user/42/reminders/wakeup",
        "",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&body), "ERR_ACTOR_REMINDER_DELETE");
}

#[tokio::test]
async fn test_timer_create_and_delete() {
    let h = harness(ScriptedRuntime::new());
    let actor = ActorReference::new("user", "42");

    let (status, _, _) = send(
        &h.router,
        Method::POST,
        "/v1.0/actors/user/42/timers/tick",
        r#"{"dueTime":"1s","period":"5s","callback":"onTick"}"#,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        h.runtime.timer(&actor, "tick").and_then(|t| t.callback),
        Some("onTick".to_string())
    );

    let (status, _, _) = send(
        &h.router,
        Method::DELETE,
        "/v1.0/actors/user/42/timers/tick",
        "",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(h.runtime.timer(&actor, "tick").is_none());
}

#[tokio::test]
async fn test_timer_with_invalid_body_never_reaches_runtime() {
    let h = harness(ScriptedRuntime::new());
    let (status, _, body) = send(
        &h.router,
        Method::PUT,
        "/v1.0/actors/user/42/timers/tick",
        "{broken",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "ERR_MALFORMED_REQUEST");
    assert_eq!(h.runtime.calls(RuntimeOp::CreateTimer), 0);
}

#[tokio::test]
async fn test_state_transaction_not_hosted() {
    let h = harness(ScriptedRuntime::new());
    let (status, _, body) = send(
        &h.router,
        Method::POST,
        "/v1.0/actors/user/42/state",
        r#"[{"operation":"upsert","request":{"key":"k","value":1}}]"#,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "ERR_ACTOR_INSTANCE_MISSING");
    assert_eq!(h.runtime.calls(RuntimeOp::Transaction), 0);
}

#[tokio::test]
async fn test_state_transaction_forwards_batch() {
    let h = harness(ScriptedRuntime::new().hosted());
    let (status, _, _) = send(
        &h.router,
        Method::PUT,
        "/v1.0/actors/user/42/state",
        r#"[
            {"operation":"upsert","request":{"key":"a","value":{"n":1}}},
            {"operation":"delete","request":{"key":"b"}}
        ]"#,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        h.runtime.last_transaction(),
        Some(vec![
            TransactionalOperation::Upsert {
                key: "a".to_string(),
                value: serde_json::json!({"n": 1}),
            },
            TransactionalOperation::Delete {
                key: "b".to_string()
            },
        ])
    );
}

#[tokio::test]
async fn test_state_transaction_failure() {
    let h = harness(
        ScriptedRuntime::new()
            .hosted()
            .failing(RuntimeOp::Transaction, RuntimeError::failed("conflict")),
    );
    let (status, _, body) = send(
        &h.router,
        Method::POST,
        "/v1.0/actors/user/42/state",
        "[]",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&body), "ERR_ACTOR_STATE_TRANSACTION_SAVE");
    assert_eq!(h.runtime.calls(RuntimeOp::Transaction), 1);
}

#[tokio::test]
async fn test_get_state_variants() {
    let h = harness(ScriptedRuntime::new().hosted().with_state("k", b"{\"v\":1}".to_vec()));

    let (status, headers, body) =
        send(&h.router, Method::GET, "/v1.0/actors/user/42/state/k", "", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&headers, "content-type"), Some("application/json"));
    assert_eq!(body, b"{\"v\":1}".to_vec());

    let (status, _, body) = send(
        &h.router,
        Method::GET,
        "/v1.0/actors/user/42/state/absent",
        "",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_get_state_errors() {
    let h = harness(ScriptedRuntime::new());
    let (status, _, body) =
        send(&h.router, Method::GET, "/v1.0/actors/user/42/state/k", "", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "ERR_ACTOR_INSTANCE_MISSING");

    let h = harness(
        ScriptedRuntime::new()
            .hosted()
            .failing(RuntimeOp::GetState, RuntimeError::failed("read failed")),
    );
    let (status, _, body) =
        send(&h.router, Method::GET, "/v1.0/actors/user/42/state/k", "", &[]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&body), "ERR_ACTOR_STATE_GET");
}

#[tokio::test]
async fn test_invoke_builds_envelope_from_request() {
    let h = harness(ScriptedRuntime::new());
    let (status, _, body) = send(
        &h.router,
        Method::PUT,
        "/v1.0/actors/user/42/method/deposit?amount=10",
        r#"{"currency":"EUR"}"#,
        &[("content-type", "application/json"), ("x-trace", "abc")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, br#"{"currency":"EUR"}"#.to_vec());

    let envelope = h.runtime.last_envelope().expect("runtime was called");
    assert_eq!(envelope.method, "deposit");
    assert_eq!(envelope.verb, "PUT");
    assert_eq!(envelope.query, "amount=10");
    assert_eq!(envelope.content_type, "application/json");
    assert_eq!(
        envelope.metadata.get("x-trace"),
        Some(&vec!["abc".to_string()])
    );
}

#[tokio::test]
async fn test_invoke_keeps_path_actor_for_encoded_method() {
    let h = harness(ScriptedRuntime::new());
    let (status, _, _) = send(
        &h.router,
        Method::POST,
        "/v1.0/actors/user/42/method/..%2F..%2Fother%2F1%2Fmethod%2Fx%3Fadmin%3D1",
        "",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        h.runtime.last_invoked(),
        Some(ActorReference::new("user", "42"))
    );
    let envelope = h.runtime.last_envelope().expect("runtime was called");
    assert_eq!(envelope.method, "../../other/1/method/x?admin=1");
    assert!(envelope.query.is_empty());
}

#[tokio::test]
async fn test_invoke_propagates_runtime_status_and_headers() {
    let mut headers = MetadataMap::new();
    headers.insert("x-actor".to_string(), vec!["user/42".to_string()]);
    let h = harness(ScriptedRuntime::new().with_invoke_response(InvokeResponse {
        status: InvokeStatus::http(202),
        headers,
        content_type: Some("text/plain".to_string()),
        data: b"queued".to_vec(),
    }));

    let (status, response_headers, body) = send(
        &h.router,
        Method::GET,
        "/v1.0/actors/user/42/method/enqueue",
        "",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(header(&response_headers, "x-actor"), Some("user/42"));
    assert_eq!(header(&response_headers, "content-type"), Some("text/plain"));
    assert_eq!(body, b"queued".to_vec());

    let h = harness(ScriptedRuntime::new().with_invoke_response(InvokeResponse {
        status: InvokeStatus::canonical(CanonicalCode::PermissionDenied),
        headers: MetadataMap::new(),
        content_type: None,
        data: Vec::new(),
    }));
    let (status, response_headers, _) = send(
        &h.router,
        Method::DELETE,
        "/v1.0/actors/user/42/method/drop",
        "",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        header(&response_headers, "content-type"),
        Some("application/json")
    );
}

#[tokio::test]
async fn test_invoke_retries_pre_lock_failures_only() {
    let resiliency = Resiliency::new(ResiliencyConfig {
        actor_pre_lock: RetryPolicy::new(3, 1, 2).with_jitter(0.0),
        ..ResiliencyConfig::default()
    });
    let h = harness_with(
        ScriptedRuntime::new().failing_times(
            RuntimeOp::Call,
            2,
            RuntimeError::Unavailable("placement".to_string()),
        ),
        resiliency.clone(),
    );
    let (status, _, _) = send(
        &h.router,
        Method::POST,
        "/v1.0/actors/user/42/method/ping",
        "{}",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.runtime.calls(RuntimeOp::Call), 3);

    let h = harness_with(
        ScriptedRuntime::new().failing(RuntimeOp::Call, RuntimeError::failed("boom")),
        resiliency,
    );
    let (status, _, body) = send(
        &h.router,
        Method::POST,
        "/v1.0/actors/user/42/method/ping",
        "{}",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&body), "ERR_ACTOR_INVOKE_METHOD");
    assert_eq!(h.runtime.calls(RuntimeOp::Call), 1);
}
