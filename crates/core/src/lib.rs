//! Capa core - the actor gateway behind the sidecar's HTTP and RPC adapters.
//!
//! The [`ActorGateway`] turns decoded requests into canonical actor
//! operations against an [`ActorRuntime`]. Around it sit the pieces both
//! adapters share:
//!
//! - [`GatewayError`] / [`ErrorCode`]: the closed set of client-visible failures
//! - [`CanonicalCode`]: RPC status codes and their HTTP equivalents
//! - [`Resiliency`]: pre-lock retry for actor invocation
//! - [`MetadataRegistry`]: extended metadata and the readiness flag
//! - [`ShutdownHandle`]: the process-wide shutdown token
//!
//! [`InMemoryActorRuntime`] is a local single-instance runtime. With the
//! `testing` feature, [`testing::ScriptedRuntime`] is available as a test
//! double.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod error;
pub mod gateway;
pub mod registry;
pub mod resiliency;
pub mod result;
pub mod runtime;
pub mod shutdown;
pub mod status;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ErrorCode, GatewayError, RuntimeError};
pub use gateway::ActorGateway;
pub use registry::{MetadataRegistry, SidecarMetadata};
pub use resiliency::{ActorPreLockPolicy, Resiliency, ResiliencyConfig, RetryPolicy, RetryState};
pub use result::{Result, RuntimeResult};
pub use runtime::{ActorInvoker, ActorRuntime, InMemoryActorRuntime};
pub use shutdown::ShutdownHandle;
pub use status::{CanonicalCode, http_status_from_code};
pub use types::{
    ActiveActorsCount, ActorReference, InvokeEnvelope, InvokeResponse, InvokeStatus, MetadataMap,
    ReminderSpec, RenameReminderBody, ScheduleKey, TimerSpec, TransactionalOperation,
};
