//! Result aliases for gateway and runtime calls.

use crate::error::{GatewayError, RuntimeError};

/// Result of a gateway operation. The error is always client-visible.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Result of a call into the actor runtime.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
