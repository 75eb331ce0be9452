//! Sidecar metadata and readiness.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tracing::info;

use crate::error::GatewayError;
use crate::types::ActiveActorsCount;

/// Concurrent store for extended metadata plus the readiness flag.
///
/// Shared through an `Arc` by both adapters and the lifecycle.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    extended: DashMap<String, String>,
    ready: AtomicBool,
}

impl MetadataRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert one entry. Last writer wins.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.extended.insert(key.into(), value.into());
    }

    /// Point-in-time copy of the extended metadata, ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.extended
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Flip readiness on. There is no way back.
    pub fn mark_ready(&self) {
        if !self.ready.swap(true, Ordering::AcqRel) {
            info!("sidecar ready");
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn check_ready(&self) -> Result<(), GatewayError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(GatewayError::health_not_ready())
        }
    }
}

/// Body of the metadata read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SidecarMetadata {
    pub id: String,
    pub actors: Vec<ActiveActorsCount>,
    pub extended: BTreeMap<String, String>,
}

impl SidecarMetadata {
    pub fn to_json(&self) -> Result<Vec<u8>, GatewayError> {
        serde_json::to_vec(self).map_err(GatewayError::metadata_get)
    }
}
