//! Shared shutdown signal.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cloneable handle to the process-wide shutdown token.
///
/// Adapters call [`request`](Self::request); the lifecycle observes
/// [`cancelled`](Self::cancelled) and runs the shutdown sequence outside the
/// request that triggered it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn request(&self) {
        if !self.token.is_cancelled() {
            info!("shutdown requested");
        }
        self.token.cancel();
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Token cancelled together with this handle, but cancellable alone.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_request_wakes_waiters() {
        let handle = ShutdownHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        assert!(!handle.is_requested());
        handle.request();
        assert!(handle.is_requested());
        let joined = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[test]
    fn test_child_token_follows_parent() {
        let handle = ShutdownHandle::new();
        let child = handle.child_token();
        child.cancel();
        assert!(!handle.is_requested());

        let second = handle.child_token();
        handle.request();
        assert!(second.is_cancelled());
    }
}
