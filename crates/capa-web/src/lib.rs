//! Capa Web - the sidecar's HTTP adapter.
//!
//! Decodes HTTP requests into [`capa_core::ActorGateway`] calls and renders
//! the results: empty results as `204`, data as `200` with a JSON (or echoed)
//! content type, failures as an [`ErrorResponse`] with `400` or `500`.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

mod error;
pub mod responses;
pub mod routes;
mod server;
mod state;

pub use error::{ErrorResponse, HttpError, status_for};
pub use routes::{API_VERSION_V1, ApiEndpoints, Endpoint};
pub use server::serve;
pub use state::AppState;

/// Router over an endpoint table.
#[must_use]
pub fn build_router(endpoints: &[Endpoint], state: AppState) -> Router {
    let router = endpoints
        .iter()
        .fold(Router::new(), |router, endpoint| {
            router.route(&endpoint.path(), endpoint.handler.clone())
        });

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router serving the internal endpoint table.
#[must_use]
pub fn create_router(state: AppState) -> Router {
    let endpoints = ApiEndpoints::new();
    info!(
        endpoints = endpoints.internal.len(),
        "creating internal HTTP router"
    );
    build_router(&endpoints.internal, state)
}

/// Router serving only the public endpoint table.
#[must_use]
pub fn create_public_router(state: AppState) -> Router {
    let endpoints = ApiEndpoints::new();
    info!(
        endpoints = endpoints.public.len(),
        "creating public HTTP router"
    );
    build_router(&endpoints.public, state)
}

/// Web adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] ::axum::http::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<std::convert::Infallible> for Error {
    fn from(value: std::convert::Infallible) -> Self {
        match value {}
    }
}
