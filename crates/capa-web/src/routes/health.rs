//! Readiness probe and shutdown trigger.

use axum::{extract::State, http::StatusCode};

use crate::error::Result;
use crate::state::AppState;

/// GET /v1.0/healthz
pub async fn healthz(State(state): State<AppState>) -> Result<StatusCode> {
    state.registry.check_ready()?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1.0/shutdown
///
/// Answers immediately. The request only cancels the shared token; the
/// shutdown sequence runs wherever the token is observed.
pub async fn shutdown(State(state): State<AppState>) -> StatusCode {
    state.shutdown.request();
    StatusCode::NO_CONTENT
}
