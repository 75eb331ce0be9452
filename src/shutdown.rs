//! Graceful shutdown handling for the sidecar.
//!
//! Handles SIGTERM/SIGINT and API shutdown requests. Once cancellation is
//! observed the coordinator stops the actor runtime, gives in-flight requests
//! a bounded grace period and then abandons whatever is left.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use capa_core::{ActorGateway, ShutdownHandle};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// What started the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM signal received
    Sigterm,
    /// SIGINT signal received (Ctrl+C)
    Sigint,
    /// Shutdown requested through the HTTP or RPC API
    Requested,
    /// A server failed
    Fatal,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sigterm => write!(f, "SIGTERM"),
            Self::Sigint => write!(f, "SIGINT"),
            Self::Requested => write!(f, "REQUESTED"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// Cancellation observed
    Initiating,
    /// Stopping the runtime's actor subsystem
    StoppingRuntime,
    /// Waiting for in-flight requests
    Draining,
    /// Sequence finished
    Complete,
}

/// Statistics about the shutdown process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownStats {
    /// Whether the grace period ran out before every server drained
    pub forced: bool,
    /// Total shutdown duration in milliseconds
    pub total_duration_ms: u64,
}

/// Runs the shutdown sequence exactly once.
pub struct ShutdownCoordinator {
    phase: RwLock<ShutdownPhase>,
    initiated: AtomicBool,
    handle: ShutdownHandle,
    grace: Duration,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new(handle: ShutdownHandle, grace: Duration) -> Self {
        Self {
            phase: RwLock::new(ShutdownPhase::Running),
            initiated: AtomicBool::new(false),
            handle,
            grace,
        }
    }

    pub async fn phase(&self) -> ShutdownPhase {
        *self.phase.read().await
    }

    #[must_use]
    pub fn is_shutdown_initiated(&self) -> bool {
        self.initiated.load(Ordering::Acquire)
    }

    /// Record the cause and cancel the shared token. Returns `false` if a
    /// shutdown was already initiated.
    pub async fn initiate_shutdown(&self, signal: ShutdownSignal) -> bool {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!(signal = %signal, "Shutdown already in progress, ignoring duplicate signal");
            return false;
        }

        info!(signal = %signal, "Initiating graceful shutdown");
        *self.phase.write().await = ShutdownPhase::Initiating;
        self.handle.request();
        true
    }

    /// Execute the sequence: stop the runtime, then wait up to the grace
    /// period for `drain` to finish.
    pub async fn shutdown<F>(&self, gateway: &ActorGateway, drain: F) -> ShutdownStats
    where
        F: Future<Output = ()>,
    {
        // API requests cancel the token without going through the coordinator.
        if !self.is_shutdown_initiated() {
            self.initiate_shutdown(ShutdownSignal::Requested).await;
        }

        let start = Instant::now();
        let mut stats = ShutdownStats::default();
        info!("Starting graceful shutdown sequence");

        *self.phase.write().await = ShutdownPhase::StoppingRuntime;
        gateway.stop_runtime().await;

        *self.phase.write().await = ShutdownPhase::Draining;
        if timeout(self.grace, drain).await.is_err() {
            warn!(
                grace_secs = self.grace.as_secs(),
                "Grace period exceeded, abandoning in-flight requests"
            );
            stats.forced = true;
        }

        *self.phase.write().await = ShutdownPhase::Complete;
        stats.total_duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            duration_ms = stats.total_duration_ms,
            forced = stats.forced,
            "Graceful shutdown complete"
        );
        stats
    }
}

/// Install OS signal handlers (SIGTERM, SIGINT).
///
/// The task ends on the first signal or when shutdown is requested by other
/// means.
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) -> JoinHandle<()> {
    info!("Installing OS signal handlers");

    tokio::spawn(async move {
        let requested = coordinator.handle.clone();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };

            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGINT handler");
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                    coordinator.initiate_shutdown(ShutdownSignal::Sigterm).await;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT");
                    coordinator.initiate_shutdown(ShutdownSignal::Sigint).await;
                }
                () = requested.cancelled() => {}
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        info!("Received Ctrl+C");
                        coordinator.initiate_shutdown(ShutdownSignal::Sigint).await;
                    }
                    Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
                },
                () = requested.cancelled() => {}
            }
        }
    })
}
