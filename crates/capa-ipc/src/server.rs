//! Accept loop and per-connection request handling.

use std::net::SocketAddr;
use std::sync::Arc;

use capa_core::CanonicalCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frame;
use crate::messages::{RpcRequest, RpcResponse, RpcStatus};
use crate::service::RpcService;

/// Responses queued per connection before request tasks wait on the writer.
const RESPONSE_QUEUE_DEPTH: usize = 64;

/// Requests handled concurrently per connection before the reader stops
/// taking frames off the socket.
pub const MAX_IN_FLIGHT_PER_CONNECTION: usize = 64;

/// Serve RPC connections until `shutdown` is cancelled.
///
/// On shutdown the listener stops accepting, every connection stops reading
/// new requests, and in-flight requests are answered before this returns.
pub async fn serve(
    listener: TcpListener,
    service: Arc<RpcService>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    serve_with_limit(listener, service, shutdown, MAX_IN_FLIGHT_PER_CONNECTION).await
}

/// [`serve`] with an explicit per-connection in-flight bound.
pub async fn serve_with_limit(
    listener: TcpListener,
    service: Arc<RpcService>,
    shutdown: CancellationToken,
    max_in_flight: usize,
) -> std::io::Result<()> {
    let max_in_flight = max_in_flight.max(1);
    let addr = listener.local_addr()?;
    info!(%addr, "RPC server listening");

    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(handle_connection(
                        stream,
                        peer,
                        Arc::clone(&service),
                        shutdown.clone(),
                        max_in_flight,
                    ));
                }
                Err(e) => warn!(%addr, error = %e, "failed to accept RPC connection"),
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "RPC connection task failed");
                }
            }
        }
    }

    drop(listener);
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "RPC connection task failed");
        }
    }

    info!(%addr, "RPC server stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<RpcService>,
    shutdown: CancellationToken,
    max_in_flight: usize,
) {
    debug!(%peer, "RPC connection opened");
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel::<RpcResponse>(RESPONSE_QUEUE_DEPTH);
    let writer_task = tokio::spawn(write_responses(writer, rx, peer));

    let in_flight = Arc::new(Semaphore::new(max_in_flight));
    let mut requests = JoinSet::new();
    loop {
        // Taken before reading so a full connection leaves frames in the socket.
        let permit = tokio::select! {
            () = shutdown.cancelled() => break,
            permit = Arc::clone(&in_flight).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        while requests.try_join_next().is_some() {}

        let read = tokio::select! {
            () = shutdown.cancelled() => break,
            read = frame::read_payload(&mut reader) => read,
        };

        let payload = match read {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(e) if e.is_malformed_frame() => {
                debug!(%peer, error = %e, "rejecting malformed frame");
                let _ = tx.send(RpcResponse::error(0, RpcStatus::malformed(&e))).await;
                break;
            }
            Err(e) => {
                debug!(%peer, error = %e, "RPC connection read failed");
                break;
            }
        };

        let request: RpcRequest = match frame::decode(&payload) {
            Ok(request) => request,
            Err(e) => {
                debug!(%peer, error = %e, "rejecting undecodable request");
                let _ = tx.send(RpcResponse::error(0, RpcStatus::malformed(&e))).await;
                break;
            }
        };

        let service = Arc::clone(&service);
        let tx = tx.clone();
        requests.spawn(async move {
            let response = service.handle(request).await;
            // The writer is gone only if the peer went away.
            let _ = tx.send(response).await;
            drop(permit);
        });
    }

    while requests.join_next().await.is_some() {}
    drop(tx);
    if let Err(e) = writer_task.await {
        warn!(%peer, error = %e, "RPC writer task failed");
    }
    debug!(%peer, "RPC connection closed");
}

/// Single writer per connection: responses go out in completion order.
async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<RpcResponse>, peer: SocketAddr)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let frame = match frame::encode(&response) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%peer, id = response.id, error = %e, "failed to encode RPC response");
                let status = RpcStatus::new(CanonicalCode::Internal, "", e.to_string());
                match frame::encode(&RpcResponse::error(response.id, status)) {
                    Ok(frame) => frame,
                    Err(_) => continue,
                }
            }
        };
        if let Err(e) = writer.write_all(&frame).await {
            debug!(%peer, error = %e, "RPC connection write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
