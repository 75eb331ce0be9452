//! Transport-independent actor operations.
//!
//! Both adapters decode their requests into calls on [`ActorGateway`] and
//! encode whatever it returns. The gateway enforces the runtime-attached
//! precondition and the hosting check, wraps invocation with the pre-lock
//! retry policy, and classifies every runtime failure into a
//! [`GatewayError`].

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::GatewayError;
use crate::resiliency::Resiliency;
use crate::result::Result;
use crate::runtime::ActorRuntime;
use crate::types::{
    ActiveActorsCount, ActorReference, InvokeEnvelope, InvokeResponse, ReminderSpec, TimerSpec,
    TransactionalOperation,
};

pub struct ActorGateway {
    runtime: OnceLock<Arc<dyn ActorRuntime>>,
    resiliency: Arc<Resiliency>,
}

impl ActorGateway {
    /// A gateway with no runtime attached. Every actor operation fails with
    /// `ERR_ACTOR_RUNTIME_NOT_FOUND` until [`attach_runtime`](Self::attach_runtime).
    #[must_use]
    pub fn new(resiliency: Arc<Resiliency>) -> Self {
        Self {
            runtime: OnceLock::new(),
            resiliency,
        }
    }

    #[must_use]
    pub fn with_runtime(resiliency: Arc<Resiliency>, runtime: Arc<dyn ActorRuntime>) -> Self {
        let gateway = Self::new(resiliency);
        // A fresh OnceLock cannot already be set.
        let _ = gateway.runtime.set(runtime);
        gateway
    }

    /// Attach the runtime. The reference is set once; returns `false` if a
    /// runtime was already attached.
    pub fn attach_runtime(&self, runtime: Arc<dyn ActorRuntime>) -> bool {
        self.runtime.set(runtime).is_ok()
    }

    #[must_use]
    pub fn has_runtime(&self) -> bool {
        self.runtime.get().is_some()
    }

    /// The attached runtime, or `ERR_ACTOR_RUNTIME_NOT_FOUND`.
    ///
    /// Adapters call this before decoding a request body so a missing
    /// runtime is reported regardless of the body.
    pub fn ensure_runtime(&self) -> Result<&Arc<dyn ActorRuntime>> {
        self.runtime.get().ok_or_else(GatewayError::runtime_not_found)
    }

    pub async fn create_reminder(
        &self,
        actor: &ActorReference,
        name: &str,
        reminder: ReminderSpec,
    ) -> Result<()> {
        let runtime = self.ensure_runtime()?;
        runtime
            .create_reminder(reminder.bind(actor, name))
            .await
            .map_err(|e| GatewayError::reminder_create(&e))
    }

    pub async fn rename_reminder(
        &self,
        actor: &ActorReference,
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        let runtime = self.ensure_runtime()?;
        runtime
            .rename_reminder(actor, old_name, new_name)
            .await
            .map_err(|e| GatewayError::reminder_rename(&e))
    }

    pub async fn delete_reminder(&self, actor: &ActorReference, name: &str) -> Result<()> {
        let runtime = self.ensure_runtime()?;
        runtime
            .delete_reminder(actor, name)
            .await
            .map_err(|e| GatewayError::reminder_delete(&e))
    }

    /// `Ok(None)` when the reminder does not exist.
    pub async fn get_reminder(
        &self,
        actor: &ActorReference,
        name: &str,
    ) -> Result<Option<ReminderSpec>> {
        let runtime = self.ensure_runtime()?;
        runtime
            .get_reminder(actor, name)
            .await
            .map_err(|e| GatewayError::reminder_get(&e))
    }

    pub async fn create_timer(
        &self,
        actor: &ActorReference,
        name: &str,
        timer: TimerSpec,
    ) -> Result<()> {
        let runtime = self.ensure_runtime()?;
        runtime
            .create_timer(timer.bind(actor, name))
            .await
            .map_err(|e| GatewayError::timer_create(&e))
    }

    pub async fn delete_timer(&self, actor: &ActorReference, name: &str) -> Result<()> {
        let runtime = self.ensure_runtime()?;
        runtime
            .delete_timer(actor, name)
            .await
            .map_err(|e| GatewayError::timer_delete(&e))
    }

    /// Forward the whole batch to the runtime once the actor is confirmed
    /// to be hosted here. Never retried.
    pub async fn execute_state_transaction(
        &self,
        actor: &ActorReference,
        operations: Vec<TransactionalOperation>,
    ) -> Result<()> {
        let runtime = self.ensure_runtime()?;
        if !runtime.is_actor_hosted(actor).await {
            return Err(GatewayError::instance_missing());
        }
        runtime
            .transactional_state_operation(actor, operations)
            .await
            .map_err(|e| GatewayError::state_transaction_save(&e))
    }

    /// `Ok(None)` when the key holds no data.
    pub async fn get_state(&self, actor: &ActorReference, key: &str) -> Result<Option<Vec<u8>>> {
        let runtime = self.ensure_runtime()?;
        if !runtime.is_actor_hosted(actor).await {
            return Err(GatewayError::instance_missing());
        }
        let data = runtime
            .get_state(actor, key)
            .await
            .map_err(|e| GatewayError::state_get(&e))?;
        Ok(data.filter(|bytes| !bytes.is_empty()))
    }

    /// Invoke a method through the actor's pre-lock retry policy.
    ///
    /// `ctx` is the request's cancellation context; once cancelled no
    /// further attempts are made.
    pub async fn invoke_actor(
        &self,
        ctx: &CancellationToken,
        actor: &ActorReference,
        envelope: InvokeEnvelope,
    ) -> Result<InvokeResponse> {
        let runtime: &dyn ActorRuntime = self.ensure_runtime()?.as_ref();
        let policy = self.resiliency.actor_pre_lock_policy(actor);
        let request = &envelope;
        policy
            .run(ctx, move || runtime.call(actor, request.clone()))
            .await
            .map_err(|e| {
                debug!(
                    actor = %actor,
                    method = %envelope.method,
                    error = %e,
                    "actor invocation failed"
                );
                GatewayError::invoke_method(&e)
            })
    }

    /// `false` when no runtime is attached.
    pub async fn is_hosted(&self, actor: &ActorReference) -> bool {
        match self.runtime.get() {
            Some(runtime) => runtime.is_actor_hosted(actor).await,
            None => false,
        }
    }

    pub async fn active_actors_count(&self) -> Vec<ActiveActorsCount> {
        match self.runtime.get() {
            Some(runtime) => runtime.active_actors_count().await,
            None => Vec::new(),
        }
    }

    /// Stop the runtime's actor subsystem. No-op without a runtime.
    pub async fn stop_runtime(&self) {
        if let Some(runtime) = self.runtime.get() {
            runtime.stop().await;
        }
    }
}
