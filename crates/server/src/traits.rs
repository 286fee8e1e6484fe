//! Server lifecycle traits
//!
//! Every listener implements [`Server`]. [`ServerExt`] adds spawning and
//! Ctrl+C handling on top.

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A listener with a cancellable run loop
///
/// Implemented by [`HttpServer`](crate::http::HttpServer),
/// [`WebSocketServer`](crate::websocket::WebSocketServer) and
/// [`CombinedServer`](crate::CombinedServer).
#[async_trait]
pub trait Server: Send + Sync + 'static {
    /// Name used in logs (e.g. "http", "websocket")
    fn name(&self) -> &str;

    /// The bound address while running, `None` otherwise
    fn address(&self) -> Option<SocketAddr>;

    fn is_running(&self) -> bool;

    /// Bind, serve until `shutdown` is cancelled, then drain connections
    ///
    /// Returns `Ok(())` on a clean shutdown and an error if binding fails.
    async fn run(&self, shutdown: CancellationToken) -> Result<()>;
}

/// Convenience methods available on every [`Server`]
pub trait ServerExt: Server + Sized {
    /// Run the server on a new task
    ///
    /// Cancel the returned token to stop it, then await the handle.
    fn spawn(self) -> (tokio::task::JoinHandle<Result<()>>, CancellationToken) {
        let token = CancellationToken::new();
        let token_clone = token.clone();
        let handle = tokio::spawn(async move { self.run(token_clone).await });
        (handle, token)
    }

    /// Run until Ctrl+C
    fn run_with_ctrl_c(self) -> impl std::future::Future<Output = Result<()>> + Send {
        async move {
            let shutdown = crate::shutdown::ShutdownController::with_ctrl_c();
            self.run(shutdown.token()).await
        }
    }
}

impl<T: Server + Sized> ServerExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct IdleServer {
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Server for IdleServer {
        fn name(&self) -> &str {
            "idle"
        }

        fn address(&self) -> Option<SocketAddr> {
            None
        }

        fn is_running(&self) -> bool {
            !self.stopped.load(Ordering::SeqCst)
        }

        async fn run(&self, shutdown: CancellationToken) -> Result<()> {
            shutdown.cancelled().await;
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_spawn_stops_on_cancel() {
        let stopped = Arc::new(AtomicBool::new(false));
        let server = IdleServer {
            stopped: stopped.clone(),
        };

        let (handle, token) = server.spawn();
        token.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
        assert!(stopped.load(Ordering::SeqCst));
    }
}
