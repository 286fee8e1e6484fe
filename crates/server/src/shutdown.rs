//! Shutdown coordination
//!
//! A single root `CancellationToken` is cancelled on Ctrl+C or on demand.
//! Servers, change loops and reconciliation workers each hold a child
//! token so cancelling the root stops all of them.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns the root cancellation token of the process
///
/// ```ignore
/// let shutdown = ShutdownController::with_ctrl_c();
/// tokio::spawn(worker.run(shutdown.child_token()));
/// server.run(shutdown.child_token()).await?;
/// ```
#[derive(Clone)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Create a controller that cancels itself on Ctrl+C
    pub fn with_ctrl_c() -> Self {
        let controller = Self::new();
        let token = controller.token.clone();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, initiating graceful shutdown...");
                    token.cancel();
                }
                Err(e) => {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
            }
        });

        controller
    }

    /// A token cancelled together with this controller
    ///
    /// Cancelling the child does not affect the controller.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self) {
        info!("Manual shutdown triggered");
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_shutdown_reaches_children() {
        let controller = ShutdownController::new();
        let token = controller.child_token();

        assert!(!token.is_cancelled());
        controller.shutdown();

        assert!(controller.is_cancelled());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_cancel_is_local() {
        let controller = ShutdownController::new();
        let reconcile = controller.child_token();
        let server = controller.child_token();

        reconcile.cancel();
        assert!(!server.is_cancelled());
        assert!(!controller.is_cancelled());
    }
}
