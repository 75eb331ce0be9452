//! Interface to the actor runtime that executes, places and persists actors.

mod memory;

pub use memory::{ActorInvoker, InMemoryActorRuntime};

use async_trait::async_trait;

use crate::result::RuntimeResult;
use crate::types::{
    ActiveActorsCount, ActorReference, InvokeEnvelope, InvokeResponse, ReminderSpec, TimerSpec,
    TransactionalOperation,
};

/// The actor runtime the gateway fronts.
///
/// Implementations own placement, the per-actor lock, durable storage and
/// the reminder scheduler. The gateway only validates and forwards.
#[async_trait]
pub trait ActorRuntime: Send + Sync {
    /// Whether the actor is active on this instance.
    async fn is_actor_hosted(&self, actor: &ActorReference) -> bool;

    /// Create or overwrite the reminder keyed by `(actorType, actorId, name)`.
    async fn create_reminder(&self, reminder: ReminderSpec) -> RuntimeResult<()>;

    async fn rename_reminder(
        &self,
        actor: &ActorReference,
        old_name: &str,
        new_name: &str,
    ) -> RuntimeResult<()>;

    async fn delete_reminder(&self, actor: &ActorReference, name: &str) -> RuntimeResult<()>;

    /// `Ok(None)` when no reminder exists under the name.
    async fn get_reminder(
        &self,
        actor: &ActorReference,
        name: &str,
    ) -> RuntimeResult<Option<ReminderSpec>>;

    async fn create_timer(&self, timer: TimerSpec) -> RuntimeResult<()>;

    async fn delete_timer(&self, actor: &ActorReference, name: &str) -> RuntimeResult<()>;

    /// Apply `operations` as one atomic batch.
    async fn transactional_state_operation(
        &self,
        actor: &ActorReference,
        operations: Vec<TransactionalOperation>,
    ) -> RuntimeResult<()>;

    /// JSON-encoded value stored under `key`, `Ok(None)` when absent.
    async fn get_state(&self, actor: &ActorReference, key: &str)
    -> RuntimeResult<Option<Vec<u8>>>;

    /// Invoke a method on the actor, activating it if needed.
    async fn call(
        &self,
        actor: &ActorReference,
        envelope: InvokeEnvelope,
    ) -> RuntimeResult<InvokeResponse>;

    async fn active_actors_count(&self) -> Vec<ActiveActorsCount>;

    /// Stop the actor subsystem. Further calls fail.
    async fn stop(&self);
}
