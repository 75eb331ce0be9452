//! Transport lifecycle: listener binding, server tasks and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use capa_core::{ActorGateway, InMemoryActorRuntime, MetadataRegistry, Resiliency, ShutdownHandle};
use capa_ipc::RpcService;
use capa_web::{AppState, create_public_router, create_router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::app_channel::{AppChannelError, HttpAppChannel};
use crate::config::{CapaConfig, SidecarConfig};
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal, ShutdownStats, install_signal_handlers};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no {kind} listener could be bound on {addresses:?} port {port}")]
    NoListeners {
        kind: &'static str,
        addresses: Vec<String>,
        port: u16,
    },

    #[error("failed to create app channel: {0}")]
    AppChannel(#[from] AppChannelError),

    #[error("{kind} server failed: {reason}")]
    Serve { kind: &'static str, reason: String },

    #[error("server task failed: {0}")]
    Task(String),
}

/// Bound listeners, one per reachable listen address.
#[derive(Debug, Default)]
pub struct Listeners {
    pub http: Vec<TcpListener>,
    pub public: Vec<TcpListener>,
    pub rpc: Vec<TcpListener>,
}

impl Listeners {
    /// Bind every configured address. Failed binds are logged and skipped;
    /// a listener kind with no successful bind is an error.
    pub async fn bind(config: &SidecarConfig) -> Result<Self, LifecycleError> {
        let addresses = &config.api_listen_addresses;
        let http = bind_all("HTTP", addresses, config.http_port).await?;
        let public = match config.public_port {
            Some(port) => bind_all("public HTTP", addresses, port).await?,
            None => Vec::new(),
        };
        let rpc = bind_all("RPC", addresses, config.rpc_port).await?;
        Ok(Self { http, public, rpc })
    }
}

async fn bind_all(
    kind: &'static str,
    addresses: &[String],
    port: u16,
) -> Result<Vec<TcpListener>, LifecycleError> {
    let mut listeners = Vec::with_capacity(addresses.len());
    for address in addresses {
        let target = socket_addr(address, port);
        match TcpListener::bind(&target).await {
            Ok(listener) => listeners.push(listener),
            Err(e) => warn!(kind, address = %target, error = %e, "failed to bind listener, skipping"),
        }
    }

    if listeners.is_empty() {
        return Err(LifecycleError::NoListeners {
            kind,
            addresses: addresses.to_vec(),
            port,
        });
    }
    Ok(listeners)
}

/// `host:port`, bracketing bare IPv6 hosts.
fn socket_addr(address: &str, port: u16) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}

/// The composed sidecar: gateway, registry and shutdown handle shared by
/// every server.
pub struct Sidecar {
    config: CapaConfig,
    gateway: Arc<ActorGateway>,
    registry: Arc<MetadataRegistry>,
    shutdown: ShutdownHandle,
}

impl Sidecar {
    /// Compose the sidecar with the in-memory runtime attached, forwarding
    /// invocations to the app when a callback port is configured.
    pub fn new(config: CapaConfig) -> Result<Self, LifecycleError> {
        let mut runtime = InMemoryActorRuntime::new();
        if let Some(port) = config.app.callback_port {
            info!(port, "app channel enabled");
            runtime = runtime.with_invoker(Arc::new(HttpAppChannel::new(port)?));
        }

        let resiliency = Arc::new(Resiliency::new(config.resiliency.clone()));
        let gateway = ActorGateway::with_runtime(resiliency, Arc::new(runtime));
        Ok(Self::with_gateway(config, Arc::new(gateway)))
    }

    #[must_use]
    pub fn with_gateway(config: CapaConfig, gateway: Arc<ActorGateway>) -> Self {
        Self {
            config,
            gateway,
            registry: Arc::new(MetadataRegistry::new()),
            shutdown: ShutdownHandle::new(),
        }
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn registry(&self) -> Arc<MetadataRegistry> {
        Arc::clone(&self.registry)
    }

    #[must_use]
    pub fn gateway(&self) -> Arc<ActorGateway> {
        Arc::clone(&self.gateway)
    }

    /// Serve on `listeners` until shutdown, then run the shutdown sequence.
    ///
    /// A server failure before shutdown triggers the same sequence and is
    /// returned as the error.
    pub async fn run(self, listeners: Listeners) -> Result<ShutdownStats, LifecycleError> {
        let app_id = self.config.app.app_id.clone();
        let state = AppState::new(
            app_id.clone(),
            Arc::clone(&self.gateway),
            Arc::clone(&self.registry),
            self.shutdown.clone(),
        );
        let rpc_service = Arc::new(RpcService::new(
            app_id.clone(),
            Arc::clone(&self.gateway),
            Arc::clone(&self.registry),
            self.shutdown.clone(),
        ));

        let mut servers = JoinSet::new();
        for listener in listeners.http {
            let router = create_router(state.clone());
            let token = self.shutdown.token();
            servers.spawn(async move {
                capa_web::serve(listener, router, token)
                    .await
                    .map_err(|e| serve_error("HTTP", &e))
            });
        }
        for listener in listeners.public {
            let router = create_public_router(state.clone());
            let token = self.shutdown.token();
            servers.spawn(async move {
                capa_web::serve(listener, router, token)
                    .await
                    .map_err(|e| serve_error("public HTTP", &e))
            });
        }
        for listener in listeners.rpc {
            let service = Arc::clone(&rpc_service);
            let token = self.shutdown.token();
            servers.spawn(async move {
                capa_ipc::serve(listener, service, token)
                    .await
                    .map_err(|e| serve_error("RPC", &e))
            });
        }

        let grace = Duration::from_secs(self.config.sidecar.graceful_shutdown_secs);
        let coordinator = Arc::new(ShutdownCoordinator::new(self.shutdown.clone(), grace));
        let signals = install_signal_handlers(Arc::clone(&coordinator));

        self.registry.mark_ready();
        info!(app_id = %app_id, servers = servers.len(), "capa sidecar started");

        let failure = loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break None,
                Some(joined) = servers.join_next() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break Some(e),
                    Err(e) => break Some(LifecycleError::Task(e.to_string())),
                },
            }
        };

        if let Some(e) = &failure {
            error!(error = %e, "server failed, shutting down");
            coordinator.initiate_shutdown(ShutdownSignal::Fatal).await;
        }

        let stats = coordinator
            .shutdown(&self.gateway, async {
                while let Some(joined) = servers.join_next().await {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(error = %e, "server failed while draining"),
                        Err(e) => warn!(error = %e, "server task failed while draining"),
                    }
                }
            })
            .await;
        servers.abort_all();
        signals.abort();

        match failure {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}

fn serve_error(kind: &'static str, err: &dyn std::fmt::Display) -> LifecycleError {
    LifecycleError::Serve {
        kind,
        reason: err.to_string(),
    }
}

/// Local addresses of a listener set, for logging and tests.
#[must_use]
pub fn local_addrs(listeners: &[TcpListener]) -> Vec<SocketAddr> {
    listeners
        .iter()
        .filter_map(|listener| listener.local_addr().ok())
        .collect()
}
