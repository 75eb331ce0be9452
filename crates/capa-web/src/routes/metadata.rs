//! Metadata endpoints: `GET /v1.0/metadata`, `PUT /v1.0/metadata/{key}`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use capa_core::SidecarMetadata;

use crate::error::Result;
use crate::responses;
use crate::state::AppState;

/// GET /v1.0/metadata
pub async fn get_metadata(State(state): State<AppState>) -> Result<Response> {
    let metadata = SidecarMetadata {
        id: state.app_id.to_string(),
        actors: state.gateway.active_actors_count().await,
        extended: state.registry.snapshot(),
    };
    Ok(responses::json(StatusCode::OK, metadata.to_json()?))
}

/// PUT /v1.0/metadata/{key}
///
/// The raw body becomes the value.
pub async fn put_metadata(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> StatusCode {
    state
        .registry
        .set(key, String::from_utf8_lossy(&body).into_owned());
    StatusCode::NO_CONTENT
}
