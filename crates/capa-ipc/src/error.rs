//! Transport and client errors

use std::io::ErrorKind as IoErrorKind;

use crate::messages::RpcStatus;

/// Framing errors.
///
/// All errors are recoverable and provide diagnostic context.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Message payload exceeds the 1MB limit on send.
    MessageTooLarge {
        /// Actual payload size in bytes
        actual_size: usize,
        /// Maximum allowed size
        max_size: usize,
    },

    /// End of stream reached inside a frame.
    UnexpectedEof {
        /// Bytes successfully read before EOF
        bytes_read: usize,
        /// Expected bytes (from length prefix)
        expected_bytes: usize,
    },

    /// Length prefix is zero or above the limit.
    InvalidLength {
        /// Invalid length value
        length: u32,
        /// Reason why length is invalid
        reason: String,
    },

    /// Bincode encoding failed.
    SerializationFailed {
        /// Bincode error message
        cause: String,
    },

    /// Bincode decoding failed.
    ///
    /// The frame itself was read completely, so the stream is still aligned.
    DeserializationFailed {
        /// Bincode error message
        cause: String,
        /// Bytes of payload read
        payload_bytes: usize,
    },

    /// Write operation failed.
    WriteFailed {
        /// OS error code
        error_code: Option<i32>,
        /// Error kind
        kind: IoErrorKind,
    },

    /// Read operation failed.
    ReadFailed {
        /// OS error code
        error_code: Option<i32>,
        /// Error kind
        kind: IoErrorKind,
    },
}

impl TransportError {
    pub const fn message_too_large(actual_size: usize, max_size: usize) -> Self {
        Self::MessageTooLarge {
            actual_size,
            max_size,
        }
    }

    pub const fn unexpected_eof(bytes_read: usize, expected_bytes: usize) -> Self {
        Self::UnexpectedEof {
            bytes_read,
            expected_bytes,
        }
    }

    pub fn invalid_length(length: u32, reason: impl Into<String>) -> Self {
        Self::InvalidLength {
            length,
            reason: reason.into(),
        }
    }

    pub fn serialization_failed(cause: impl Into<String>) -> Self {
        Self::SerializationFailed {
            cause: cause.into(),
        }
    }

    pub fn deserialization_failed(cause: impl Into<String>, payload_bytes: usize) -> Self {
        Self::DeserializationFailed {
            cause: cause.into(),
            payload_bytes,
        }
    }

    pub fn write_failed(err: &std::io::Error) -> Self {
        Self::WriteFailed {
            error_code: err.raw_os_error(),
            kind: err.kind(),
        }
    }

    pub fn read_failed(err: &std::io::Error) -> Self {
        Self::ReadFailed {
            error_code: err.raw_os_error(),
            kind: err.kind(),
        }
    }

    /// Whether a peer sent a frame that the server cannot accept. The
    /// server answers these with a malformed-request status before closing.
    #[must_use]
    pub const fn is_malformed_frame(&self) -> bool {
        matches!(
            self,
            Self::InvalidLength { .. } | Self::DeserializationFailed { .. }
        )
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MessageTooLarge {
                actual_size,
                max_size,
            } => {
                write!(
                    f,
                    "Message too large: {actual_size} bytes (max {max_size} bytes)"
                )
            }
            Self::UnexpectedEof {
                bytes_read,
                expected_bytes,
            } => {
                write!(
                    f,
                    "Unexpected EOF: {bytes_read} bytes read, expected {expected_bytes}"
                )
            }
            Self::InvalidLength { length, reason } => {
                write!(f, "Invalid length prefix {length}: {reason}")
            }
            Self::SerializationFailed { cause } => {
                write!(f, "Serialization failed: {cause}")
            }
            Self::DeserializationFailed {
                cause,
                payload_bytes,
            } => {
                write!(
                    f,
                    "Deserialization failed at {payload_bytes} bytes: {cause}"
                )
            }
            Self::WriteFailed { error_code, kind } => {
                write!(f, "Write failed: {kind:?} (error code: {error_code:?})")
            }
            Self::ReadFailed { error_code, kind } => {
                write!(f, "Read failed: {kind:?} (error code: {error_code:?})")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Failure seen by an [`RpcClient`](crate::RpcClient) call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with an error status.
    #[error("{}: {}", .0.error_code, .0.message)]
    Status(RpcStatus),

    /// The server closed the connection before answering.
    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("response id {actual} does not match request id {expected}")]
    IdMismatch { expected: u64, actual: u64 },

    /// The server answered with a reply of the wrong kind.
    #[error("unexpected reply for {call}")]
    UnexpectedReply { call: &'static str },
}
