//! Shared handler state.

use std::sync::Arc;

use capa_core::{ActorGateway, MetadataRegistry, ShutdownHandle};

/// Everything a handler needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub app_id: Arc<str>,
    pub gateway: Arc<ActorGateway>,
    pub registry: Arc<MetadataRegistry>,
    pub shutdown: ShutdownHandle,
}

impl AppState {
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
}
