//! # Capa
//!
//! Actor API sidecar. Serves the actor, metadata, health and shutdown API
//! over HTTP ([`capa_web`]) and RPC ([`capa_ipc`]) in front of a single
//! [`capa_core::ActorGateway`].
//!
//! This crate is the composition root: configuration, telemetry, the HTTP
//! app channel, listener lifecycle and the shutdown sequence.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod app_channel;
pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod shutdown;
pub mod telemetry;

pub use app_channel::{AppChannelError, HttpAppChannel};
pub use cli::Cli;
pub use config::{CapaConfig, ConfigError};
pub use lifecycle::{LifecycleError, Listeners, Sidecar};
pub use shutdown::{ShutdownCoordinator, ShutdownPhase, ShutdownSignal, ShutdownStats};
pub use telemetry::LogFormat;
