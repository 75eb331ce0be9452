//! Endpoint tables.
//!
//! Two ordered tables are built once at startup:
//!
//! - internal: actor, metadata, shutdown and health endpoints
//! - public: metadata and health only
//!
//! Every route is mounted under its version prefix (`/v1.0`).

use axum::{
    handler::Handler,
    http::Method,
    routing::{MethodFilter, MethodRouter, on},
};

use crate::state::AppState;

pub mod actors;
pub mod health;
pub mod metadata;

pub const API_VERSION_V1: &str = "v1.0";

/// One declarative routing entry.
#[derive(Clone)]
pub struct Endpoint {
    pub methods: Vec<Method>,
    pub route: &'static str,
    pub version: &'static str,
    pub handler: MethodRouter<AppState>,
}

impl Endpoint {
    /// A `v1.0` endpoint serving `handler` for each of `methods`.
    pub fn new<H, T>(methods: &[Method], route: &'static str, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let filter = methods
            .iter()
            .filter_map(|method| MethodFilter::try_from(method.clone()).ok())
            .reduce(MethodFilter::or);
        let handler = filter.map_or_else(MethodRouter::new, |filter| on(filter, handler));

        Self {
            methods: methods.to_vec(),
            route,
            version: API_VERSION_V1,
            handler,
        }
    }

    /// Full request path, e.g. `/v1.0/metadata`.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}/{}", self.version, self.route)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("methods", &self.methods)
            .field("route", &self.route)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// The internal and public endpoint tables.
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    pub internal: Vec<Endpoint>,
    pub public: Vec<Endpoint>,
}

impl ApiEndpoints {
    #[must_use]
    pub fn new() -> Self {
        let metadata = metadata_endpoints();
        let health = health_endpoints();

        let mut public = Vec::new();
        public.extend(metadata.iter().cloned());
        public.extend(health.iter().cloned());

        let mut internal = actor_endpoints();
        internal.extend(metadata);
        internal.extend(shutdown_endpoints());
        internal.extend(health);

        Self { internal, public }
    }
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self::new()
    }
}

fn actor_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::new(
            &[Method::POST, Method::PUT],
            "actors/{actorType}/{actorId}/state",
            actors::state_transaction,
        ),
        Endpoint::new(
            &[Method::GET, Method::POST, Method::DELETE, Method::PUT],
            "actors/{actorType}/{actorId}/method/{method}",
            actors::invoke_method,
        ),
        Endpoint::new(
            &[Method::GET],
            "actors/{actorType}/{actorId}/state/{key}",
            actors::get_state,
        ),
        Endpoint::new(
            &[Method::POST, Method::PUT],
            "actors/{actorType}/{actorId}/reminders/{name}",
            actors::create_reminder,
        ),
        Endpoint::new(
            &[Method::POST, Method::PUT],
            "actors/{actorType}/{actorId}/timers/{name}",
            actors::create_timer,
        ),
        Endpoint::new(
            &[Method::DELETE],
            "actors/{actorType}/{actorId}/reminders/{name}",
            actors::delete_reminder,
        ),
        Endpoint::new(
            &[Method::DELETE],
            "actors/{actorType}/{actorId}/timers/{name}",
            actors::delete_timer,
        ),
        Endpoint::new(
            &[Method::GET],
            "actors/{actorType}/{actorId}/reminders/{name}",
            actors::get_reminder,
        ),
        Endpoint::new(
            &[Method::PATCH],
            "actors/{actorType}/{actorId}/reminders/{name}",
            actors::rename_reminder,
        ),
    ]
}

fn metadata_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::new(&[Method::GET], "metadata", metadata::get_metadata),
        Endpoint::new(&[Method::PUT], "metadata/{key}", metadata::put_metadata),
    ]
}

fn shutdown_endpoints() -> Vec<Endpoint> {
    vec![Endpoint::new(&[Method::POST], "shutdown", health::shutdown)]
}

fn health_endpoints() -> Vec<Endpoint> {
    vec![Endpoint::new(&[Method::GET], "healthz", health::healthz)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_table_is_metadata_and_health() {
        let endpoints = ApiEndpoints::new();
        let routes: Vec<_> = endpoints.public.iter().map(|e| e.route).collect();
        assert_eq!(routes, vec!["metadata", "metadata/{key}", "healthz"]);
    }

    #[test]
    fn test_internal_table_order() {
        let endpoints = ApiEndpoints::new();
        assert_eq!(endpoints.internal.len(), 13);
        assert_eq!(
            endpoints.internal.first().map(|e| e.route),
            Some("actors/{actorType}/{actorId}/state")
        );
        assert_eq!(endpoints.internal.last().map(|e| e.route), Some("healthz"));
        assert!(
            endpoints
                .internal
                .iter()
                .any(|e| e.route == "shutdown" && e.methods == vec![Method::POST])
        );
    }

    #[test]
    fn test_every_endpoint_is_versioned() {
        let endpoints = ApiEndpoints::new();
        for endpoint in endpoints.internal.iter().chain(endpoints.public.iter()) {
            assert_eq!(endpoint.version, API_VERSION_V1);
            assert!(endpoint.path().starts_with("/v1.0/"));
        }
    }
}
