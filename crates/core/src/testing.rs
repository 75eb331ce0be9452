//! Scriptable [`ActorRuntime`] double for adapter and lifecycle tests.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Semaphore;

use crate::error::RuntimeError;
use crate::result::RuntimeResult;
use crate::runtime::ActorRuntime;
use crate::types::{
    ActiveActorsCount, ActorReference, InvokeEnvelope, InvokeResponse, ReminderSpec, ScheduleKey,
    TimerSpec, TransactionalOperation,
};

/// Operations of the runtime contract, for counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOp {
    IsHosted,
    CreateReminder,
    RenameReminder,
    DeleteReminder,
    GetReminder,
    CreateTimer,
    DeleteTimer,
    Transaction,
    GetState,
    Call,
    ActiveActorsCount,
    Stop,
}

#[derive(Debug, Clone)]
struct Failure {
    error: RuntimeError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

/// Runtime double with call counters, injectable failures and hosting
/// control.
///
/// Reminders and state are stored so reads observe earlier writes;
/// invocations answer with a configurable response.
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    calls: DashMap<RuntimeOp, usize>,
    failures: DashMap<RuntimeOp, Failure>,
    hosted: AtomicBool,
    stopped: AtomicBool,
    reminders: DashMap<ScheduleKey, ReminderSpec>,
    timers: DashMap<ScheduleKey, TimerSpec>,
    state: DashMap<String, Vec<u8>>,
    actors: Vec<ActiveActorsCount>,
    invoke_response: Option<InvokeResponse>,
    last_envelope: Mutex<Option<InvokeEnvelope>>,
    last_invoked: Mutex<Option<ActorReference>>,
    call_gate: Option<Arc<Semaphore>>,
    last_transaction: Mutex<Option<Vec<TransactionalOperation>>>,
}

impl ScriptedRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn hosted(self) -> Self {
        self.set_hosted(true);
        self
    }

    #[must_use]
    pub fn with_state(self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_invoke_response(mut self, response: InvokeResponse) -> Self {
        self.invoke_response = Some(response);
        self
    }

    #[must_use]
    /// Each invocation consumes one permit from `gate` before answering,
    /// so tests can hold calls in flight.
    #[must_use]
    pub fn with_call_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.call_gate = Some(gate);
        self
    }

    #[must_use]
    pub fn with_active_actors(mut self, actors: Vec<ActiveActorsCount>) -> Self {
        self.actors = actors;
        self
    }

    /// Every call to `op` fails with `error`.
    #[must_use]
    pub fn failing(self, op: RuntimeOp, error: RuntimeError) -> Self {
        self.failures.insert(
            op,
            Failure {
                error,
                remaining: None,
            },
        );
        self
    }

    /// The next `times` calls to `op` fail with `error`, later calls succeed.
    #[must_use]
    pub fn failing_times(self, op: RuntimeOp, times: usize, error: RuntimeError) -> Self {
        self.failures.insert(
            op,
            Failure {
                error,
                remaining: Some(times),
            },
        );
        self
    }

    pub fn set_hosted(&self, hosted: bool) {
        self.hosted.store(hosted, Ordering::Release);
    }

    #[must_use]
    pub fn calls(&self, op: RuntimeOp) -> usize {
        self.calls.get(&op).map_or(0, |count| *count)
    }

    /// Total calls across every operation except hosting checks.
    #[must_use]
    pub fn backend_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|entry| *entry.key() != RuntimeOp::IsHosted)
            .map(|entry| *entry.value())
            .sum()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn reminder(&self, actor: &ActorReference, name: &str) -> Option<ReminderSpec> {
        self.reminders
            .get(&ScheduleKey::new(actor, name))
            .map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn timer(&self, actor: &ActorReference, name: &str) -> Option<TimerSpec> {
        self.timers
            .get(&ScheduleKey::new(actor, name))
            .map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn last_envelope(&self) -> Option<InvokeEnvelope> {
        self.last_envelope
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Actor addressed by the most recent invocation.
    #[must_use]
    pub fn last_invoked(&self) -> Option<ActorReference> {
        self.last_invoked
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    #[must_use]
    pub fn last_transaction(&self) -> Option<Vec<TransactionalOperation>> {
        self.last_transaction
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    fn enter(&self, op: RuntimeOp) -> RuntimeResult<()> {
        *self.calls.entry(op).or_default() += 1;

        let Some(mut failure) = self.failures.get_mut(&op) else {
            return Ok(());
        };
        match failure.remaining {
            None => Err(failure.error.clone()),
            Some(0) => Ok(()),
            Some(n) => {
                failure.remaining = Some(n - 1);
                Err(failure.error.clone())
            }
        }
    }
}

#[async_trait]
impl ActorRuntime for ScriptedRuntime {
    async fn is_actor_hosted(&self, _actor: &ActorReference) -> bool {
        *self.calls.entry(RuntimeOp::IsHosted).or_default() += 1;
        self.hosted.load(Ordering::Acquire)
    }

    async fn create_reminder(&self, reminder: ReminderSpec) -> RuntimeResult<()> {
        self.enter(RuntimeOp::CreateReminder)?;
        self.reminders.insert(reminder.key(), reminder);
        Ok(())
    }

    async fn rename_reminder(
        &self,
        actor: &ActorReference,
        old_name: &str,
        new_name: &str,
    ) -> RuntimeResult<()> {
        self.enter(RuntimeOp::RenameReminder)?;
        if let Some((_, mut reminder)) = self.reminders.remove(&ScheduleKey::new(actor, old_name))
        {
            reminder.name = new_name.to_string();
            self.reminders.insert(reminder.key(), reminder);
        }
        Ok(())
    }

    async fn delete_reminder(&self, actor: &ActorReference, name: &str) -> RuntimeResult<()> {
        self.enter(RuntimeOp::DeleteReminder)?;
        self.reminders.remove(&ScheduleKey::new(actor, name));
        Ok(())
    }

    async fn get_reminder(
        &self,
        actor: &ActorReference,
        name: &str,
    ) -> RuntimeResult<Option<ReminderSpec>> {
        self.enter(RuntimeOp::GetReminder)?;
        Ok(self.reminder(actor, name))
    }

    async fn create_timer(&self, timer: TimerSpec) -> RuntimeResult<()> {
        self.enter(RuntimeOp::CreateTimer)?;
        self.timers.insert(timer.key(), timer);
        Ok(())
    }

    async fn delete_timer(&self, actor: &ActorReference, name: &str) -> RuntimeResult<()> {
        self.enter(RuntimeOp::DeleteTimer)?;
        self.timers.remove(&ScheduleKey::new(actor, name));
        Ok(())
    }

    async fn transactional_state_operation(
        &self,
        _actor: &ActorReference,
        operations: Vec<TransactionalOperation>,
    ) -> RuntimeResult<()> {
        self.enter(RuntimeOp::Transaction)?;
        if let Ok(mut last) = self.last_transaction.lock() {
            *last = Some(operations);
        }
        Ok(())
    }

    async fn get_state(
        &self,
        _actor: &ActorReference,
        key: &str,
    ) -> RuntimeResult<Option<Vec<u8>>> {
        self.enter(RuntimeOp::GetState)?;
        Ok(self.state.get(key).map(|entry| entry.value().clone()))
    }

    async fn call(
        &self,
        actor: &ActorReference,
        envelope: InvokeEnvelope,
    ) -> RuntimeResult<InvokeResponse> {
        if let Ok(mut last) = self.last_envelope.lock() {
            *last = Some(envelope.clone());
        }
        if let Ok(mut last) = self.last_invoked.lock() {
            *last = Some(actor.clone());
        }
        self.enter(RuntimeOp::Call)?;
        if let Some(gate) = &self.call_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        Ok(self.invoke_response.clone().unwrap_or_else(|| {
            InvokeResponse::ok(envelope.data, Some(envelope.content_type))
        }))
    }

    async fn active_actors_count(&self) -> Vec<ActiveActorsCount> {
        *self.calls.entry(RuntimeOp::ActiveActorsCount).or_default() += 1;
        self.actors.clone()
    }

    async fn stop(&self) {
        *self.calls.entry(RuntimeOp::Stop).or_default() += 1;
        self.stopped.store(true, Ordering::Release);
    }
}
