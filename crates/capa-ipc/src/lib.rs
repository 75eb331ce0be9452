//! Capa IPC - the sidecar's RPC adapter.
//!
//! Requests and responses travel over TCP as length-prefixed bincode frames.
//! [`RpcService`] decodes each [`RpcCall`] into an
//! [`ActorGateway`](capa_core::ActorGateway) operation and encodes the
//! outcome; [`serve`] runs the accept loop and [`RpcClient`] is the matching
//! client.
//!
//! # Protocol
//!
//! ```text
//! +--------+--------+--------+--------+--------------------------+
//! | Byte 0 | Byte 1 | Byte 2 | Byte 3 | Bytes 4..(4+N)           |
//! |--------+--------+--------+--------+--------------------------|
//! |       Length (big-endian u32)     |    Bincode Payload       |
//! |        N = payload size           |    (N bytes)             |
//! +--------+--------+--------+--------+--------------------------+
//! ```
//!
//! - Maximum payload size: 1MB (1,048,576 bytes)
//! - Empty payloads (length = 0) are rejected
//! - A frame that cannot be decoded is answered with an
//!   `ERR_MALFORMED_REQUEST` status under id `0`, then the connection closes

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod client;
mod error;
pub mod frame;
pub mod messages;
mod server;
mod service;

pub use client::RpcClient;
pub use error::{RpcError, TransportError, TransportResult};
pub use messages::{RpcCall, RpcReply, RpcRequest, RpcResponse, RpcStatus};
pub use server::{MAX_IN_FLIGHT_PER_CONNECTION, serve, serve_with_limit};
pub use service::RpcService;

/// Maximum allowed payload size in bytes (1MB)
pub const MAX_PAYLOAD_SIZE: usize = 1_048_576;

/// Length prefix size in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum frame size (length prefix + max payload)
pub const MAX_FRAME_SIZE: usize = LENGTH_PREFIX_SIZE + MAX_PAYLOAD_SIZE;
