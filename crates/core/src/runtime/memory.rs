//! Single-instance actor runtime held entirely in memory.
//!
//! Every actor is placed locally. Invocations for one actor are serialized
//! through a per-actor turn lock and forwarded to the application through an
//! [`ActorInvoker`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::ActorRuntime;
use crate::error::RuntimeError;
use crate::result::RuntimeResult;
use crate::types::{
    ActiveActorsCount, ActorReference, InvokeEnvelope, InvokeResponse, ReminderSpec, ScheduleKey,
    TimerSpec, TransactionalOperation,
};

/// Delivers an invocation to the application that implements the actor.
#[async_trait]
pub trait ActorInvoker: Send + Sync {
    async fn invoke(
        &self,
        actor: &ActorReference,
        envelope: InvokeEnvelope,
    ) -> RuntimeResult<InvokeResponse>;
}

/// In-memory [`ActorRuntime`].
pub struct InMemoryActorRuntime {
    /// Hosted actors and their turn locks.
    hosted: DashMap<ActorReference, Arc<Mutex<()>>>,
    reminders: DashMap<ScheduleKey, ReminderSpec>,
    timers: DashMap<ScheduleKey, TimerSpec>,
    state: DashMap<ActorReference, HashMap<String, Vec<u8>>>,
    invoker: Option<Arc<dyn ActorInvoker>>,
    stopped: AtomicBool,
}

impl InMemoryActorRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hosted: DashMap::new(),
            reminders: DashMap::new(),
            timers: DashMap::new(),
            state: DashMap::new(),
            invoker: None,
            stopped: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_invoker(mut self, invoker: Arc<dyn ActorInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Place an actor on this instance without invoking it.
    pub fn activate(&self, actor: &ActorReference) -> RuntimeResult<()> {
        self.ensure_running()?;
        self.turn_lock(actor);
        Ok(())
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn timer(&self, actor: &ActorReference, name: &str) -> Option<TimerSpec> {
        self.timers
            .get(&ScheduleKey::new(actor, name))
            .map(|entry| entry.value().clone())
    }

    fn ensure_running(&self) -> RuntimeResult<()> {
        if self.is_stopped() {
            Err(RuntimeError::Stopped)
        } else {
            Ok(())
        }
    }

    fn turn_lock(&self, actor: &ActorReference) -> Arc<Mutex<()>> {
        let entry = self.hosted.entry(actor.clone()).or_insert_with(|| {
            debug!(actor = %actor, "actor activated");
            Arc::new(Mutex::new(()))
        });
        Arc::clone(entry.value())
    }
}

impl Default for InMemoryActorRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActorRuntime for InMemoryActorRuntime {
    async fn is_actor_hosted(&self, actor: &ActorReference) -> bool {
        !self.is_stopped() && self.hosted.contains_key(actor)
    }

    async fn create_reminder(&self, reminder: ReminderSpec) -> RuntimeResult<()> {
        self.ensure_running()?;
        self.reminders.insert(reminder.key(), reminder);
        Ok(())
    }

    async fn rename_reminder(
        &self,
        actor: &ActorReference,
        old_name: &str,
        new_name: &str,
    ) -> RuntimeResult<()> {
        self.ensure_running()?;
        let Some((_, mut reminder)) = self.reminders.remove(&ScheduleKey::new(actor, old_name))
        else {
            return Err(RuntimeError::failed(format!(
                "reminder {old_name} not found for actor {actor}"
            )));
        };
        reminder.name = new_name.to_string();
        self.reminders.insert(reminder.key(), reminder);
        Ok(())
    }

    async fn delete_reminder(&self, actor: &ActorReference, name: &str) -> RuntimeResult<()> {
        self.ensure_running()?;
        self.reminders.remove(&ScheduleKey::new(actor, name));
        Ok(())
    }

    async fn get_reminder(
        &self,
        actor: &ActorReference,
        name: &str,
    ) -> RuntimeResult<Option<ReminderSpec>> {
        self.ensure_running()?;
        Ok(self
            .reminders
            .get(&ScheduleKey::new(actor, name))
            .map(|entry| entry.value().clone()))
    }

    async fn create_timer(&self, timer: TimerSpec) -> RuntimeResult<()> {
        self.ensure_running()?;
        self.timers.insert(timer.key(), timer);
        Ok(())
    }

    async fn delete_timer(&self, actor: &ActorReference, name: &str) -> RuntimeResult<()> {
        self.ensure_running()?;
        self.timers.remove(&ScheduleKey::new(actor, name));
        Ok(())
    }

    async fn transactional_state_operation(
        &self,
        actor: &ActorReference,
        operations: Vec<TransactionalOperation>,
    ) -> RuntimeResult<()> {
        self.ensure_running()?;

        // Encode everything up front so a bad value leaves the store untouched.
        let mut staged = Vec::with_capacity(operations.len());
        for operation in operations {
            match operation {
                TransactionalOperation::Upsert { key, value } => {
                    let encoded = serde_json::to_vec(&value)
                        .map_err(|e| RuntimeError::failed(format!("encoding {key}: {e}")))?;
                    staged.push((key, Some(encoded)));
                }
                TransactionalOperation::Delete { key } => staged.push((key, None)),
            }
        }

        let mut entry = self.state.entry(actor.clone()).or_default();
        for (key, value) in staged {
            match value {
                Some(bytes) => {
                    entry.insert(key, bytes);
                }
                None => {
                    entry.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn get_state(
        &self,
        actor: &ActorReference,
        key: &str,
    ) -> RuntimeResult<Option<Vec<u8>>> {
        self.ensure_running()?;
        Ok(self
            .state
            .get(actor)
            .and_then(|values| values.get(key).cloned()))
    }

    async fn call(
        &self,
        actor: &ActorReference,
        envelope: InvokeEnvelope,
    ) -> RuntimeResult<InvokeResponse> {
        self.ensure_running()?;
        let Some(invoker) = self.invoker.as_ref() else {
            return Err(RuntimeError::failed("no app channel configured"));
        };

        let lock = self.turn_lock(actor);
        let _turn = lock.lock().await;
        invoker.invoke(actor, envelope).await
    }

    async fn active_actors_count(&self) -> Vec<ActiveActorsCount> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for entry in &self.hosted {
            *counts.entry(entry.key().actor_type.clone()).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(actor_type, count)| ActiveActorsCount { actor_type, count })
            .collect()
    }

    async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let deactivated = self.hosted.len();
        self.hosted.clear();
        self.timers.clear();
        info!(deactivated, "actor runtime stopped");
    }
}
