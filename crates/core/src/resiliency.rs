//! Retry with exponential backoff and jitter for actor invocation.
//!
//! Only failures that happen before the runtime takes the actor lock are
//! retried (see [`RuntimeError::is_pre_lock`]). Anything that reached the
//! actor is returned as-is. There is no timeout at this layer.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::RuntimeError;
use crate::types::ActorReference;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 100;
const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Base delay for exponential backoff (milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,
    /// Jitter factor to add randomness (0.0 - 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        }
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Delay before retry number `attempt` (0-indexed).
    ///
    /// `min(base * 2^attempt, max)` plus up to `jitter_factor` of that value.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        let capped_delay = exponential_delay.min(self.max_delay_ms);

        let jitter_range = (capped_delay as f64) * self.jitter_factor;
        let jitter_ms = if jitter_range >= 1.0 {
            rand::thread_rng().gen_range(0.0..jitter_range).floor() as u64
        } else {
            0
        };

        Duration::from_millis(capped_delay.saturating_add(jitter_ms))
    }

    #[must_use]
    pub fn state(&self) -> RetryState {
        RetryState::new(self.clone())
    }
}

/// Tracks attempts against a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.attempt < self.policy.max_retries
    }

    /// Record a retry and return the delay to wait first, or `None` when
    /// the budget is exhausted.
    pub fn next_retry(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }

        let delay = self.policy.calculate_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}

/// Resiliency configuration: a default pre-lock policy plus per-actor-type
/// overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResiliencyConfig {
    pub actor_pre_lock: RetryPolicy,
    pub actor_types: HashMap<String, RetryPolicy>,
}

/// Resolves the policy that wraps an actor invocation.
#[derive(Debug, Clone, Default)]
pub struct Resiliency {
    config: ResiliencyConfig,
}

impl Resiliency {
    #[must_use]
    pub const fn new(config: ResiliencyConfig) -> Self {
        Self { config }
    }

    /// Never retries. Used when no resiliency configuration is present.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(ResiliencyConfig {
            actor_pre_lock: RetryPolicy::no_retry(),
            actor_types: HashMap::new(),
        })
    }

    /// Pre-lock policy for one actor.
    #[must_use]
    pub fn actor_pre_lock_policy(&self, actor: &ActorReference) -> ActorPreLockPolicy {
        let policy = self
            .config
            .actor_types
            .get(&actor.actor_type)
            .unwrap_or(&self.config.actor_pre_lock)
            .clone();
        ActorPreLockPolicy {
            actor: actor.clone(),
            policy,
        }
    }
}

/// A retry policy bound to a single actor call.
#[derive(Debug, Clone)]
pub struct ActorPreLockPolicy {
    actor: ActorReference,
    policy: RetryPolicy,
}

impl ActorPreLockPolicy {
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation`, retrying pre-lock failures until the budget is spent
    /// or `ctx` is cancelled.
    ///
    /// A context that is already cancelled fails with
    /// [`RuntimeError::Cancelled`] without calling `operation`.
    pub async fn run<T, F, Fut>(
        &self,
        ctx: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RuntimeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RuntimeError>>,
    {
        let mut state = self.policy.state();

        loop {
            if ctx.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_pre_lock() {
                return Err(err);
            }

            let Some(delay) = state.next_retry() else {
                return Err(err);
            };

            debug!(
                actor = %self.actor,
                attempt = state.current_attempt(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "retrying actor call"
            );

            tokio::select! {
                () = ctx.cancelled() => return Err(RuntimeError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, 1, 5).with_jitter(0.0)
    }

    fn bound(policy: RetryPolicy) -> ActorPreLockPolicy {
        let mut actor_types = HashMap::new();
        actor_types.insert("user".to_string(), policy);
        Resiliency::new(ResiliencyConfig {
            actor_pre_lock: RetryPolicy::no_retry(),
            actor_types,
        })
        .actor_pre_lock_policy(&ActorReference::new("user", "42"))
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay_ms, 100);
        assert_eq!(policy.max_delay_ms, 10000);
        assert!((policy.jitter_factor - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_calculate_delay_exponential() {
        let policy = RetryPolicy::new(5, 100, 10_000).with_jitter(0.0);
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_calculate_delay_capped() {
        let policy = RetryPolicy::new(100, 100, 1_000).with_jitter(0.0);
        assert_eq!(policy.calculate_delay(10), Duration::from_millis(1_000));
        assert_eq!(policy.calculate_delay(90), Duration::from_millis(1_000));
    }

    #[test]
    fn test_calculate_delay_jitter_bounded() {
        let policy = RetryPolicy::new(3, 100, 10_000).with_jitter(0.5);
        for _ in 0..50 {
            let delay = policy.calculate_delay(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(150));
        }
    }

    #[test]
    fn test_retry_state_exhausts() {
        let mut state = fast_policy(2).state();
        assert!(state.next_retry().is_some());
        assert!(state.next_retry().is_some());
        assert!(state.next_retry().is_none());
        assert_eq!(state.current_attempt(), 2);
    }

    #[test]
    fn test_actor_type_override_selected() {
        let mut actor_types = HashMap::new();
        actor_types.insert("user".to_string(), fast_policy(7));
        let resiliency = Resiliency::new(ResiliencyConfig {
            actor_pre_lock: fast_policy(1),
            actor_types,
        });

        let user = resiliency.actor_pre_lock_policy(&ActorReference::new("user", "1"));
        let order = resiliency.actor_pre_lock_policy(&ActorReference::new("order", "1"));
        assert_eq!(user.policy().max_retries, 7);
        assert_eq!(order.policy().max_retries, 1);
    }

    #[tokio::test]
    async fn test_pre_lock_failures_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = bound(fast_policy(3));
        let ctx = CancellationToken::new();

        let counter = Arc::clone(&calls);
        let result = policy
            .run(&ctx, || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(RuntimeError::Unavailable("no route".to_string()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_post_lock_failure_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = bound(fast_policy(3));
        let ctx = CancellationToken::new();

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = policy
            .run(&ctx, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RuntimeError::failed("actor method failed"))
                }
            })
            .await;

        assert_eq!(result, Err(RuntimeError::failed("actor method failed")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = bound(fast_policy(2));
        let ctx = CancellationToken::new();

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = policy
            .run(&ctx, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RuntimeError::Unavailable("still down".to_string()))
                }
            })
            .await;

        assert_eq!(
            result,
            Err(RuntimeError::Unavailable("still down".to_string()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = bound(fast_policy(3));
        let ctx = CancellationToken::new();
        ctx.cancel();

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = policy
            .run(&ctx, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(result, Err(RuntimeError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_backoff() {
        let policy = bound(RetryPolicy::new(10, 60_000, 60_000).with_jitter(0.0));
        let ctx = CancellationToken::new();
        let canceller = ctx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result: Result<(), _> = policy
            .run(&ctx, || async {
                Err(RuntimeError::HostLookup {
                    actor: "user/42".to_string(),
                    reason: "placement not ready".to_string(),
                })
            })
            .await;

        assert_eq!(result, Err(RuntimeError::Cancelled));
    }
}
