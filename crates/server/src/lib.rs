//! Server infrastructure for Simplex
//!
//! HTTP and WebSocket listeners sharing one lifecycle model.
//!
//! # Architecture
//!
//! All servers implement the [`Server`] trait. [`ServerExt`] adds
//! `spawn()` and `run_with_ctrl_c()`. Shutdown uses a `CancellationToken`
//! hierarchy: cancelling the parent cancels every child.
//!
//! ```ignore
//! use server::{CombinedServer, ServerConfig, ServerExt};
//!
//! let server = CombinedServer::new("simplex", ServerConfig::default())
//!     .with_http_router(router)
//!     .with_ws_handler(handler);
//! server.run_with_ctrl_c().await?;
//! ```

#![allow(clippy::result_large_err)]

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod port_validator;
pub mod shutdown;
pub mod traits;
pub mod websocket;

pub use config::{ports, ServerConfig};
pub use error::{Result, ServerError};
pub use health::{health_routes, HealthState, HealthStatus};
pub use http::HttpServer;
pub use port_validator::validate_ports_available;
pub use shutdown::ShutdownController;
pub use traits::{Server, ServerExt};
pub use websocket::{ConnectionId, MessageHandler, Outbound, WebSocketServer};

/// HTTP and WebSocket servers run as one unit
///
/// If either server exits on its own the other is cancelled too.
pub struct CombinedServer {
    name: String,
    config: ServerConfig,
    http_server: Option<HttpServer>,
    ws_server: Option<WebSocketServer>,
}

impl CombinedServer {
    /// Create a combined server with no protocols attached yet
    pub fn new(name: impl Into<String>, config: ServerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            http_server: None,
            ws_server: None,
        }
    }

    /// Serve `router` on the HTTP port, if one is configured
    pub fn with_http_router(mut self, router: axum::Router) -> Self {
        if self.config.http_port.is_some() {
            self.http_server = Some(HttpServer::new(self.config.clone(), router));
        }
        self
    }

    /// Dispatch WebSocket traffic to `handler`, if a WebSocket port is configured
    pub fn with_ws_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        if self.config.websocket_port.is_some() {
            self.ws_server = Some(WebSocketServer::with_shared_handler(self.config.clone(), handler));
        }
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn validate_ports(&self) -> Result<()> {
        validate_ports_available(&self.config).await
    }
}

#[async_trait::async_trait]
impl Server for CombinedServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> Option<std::net::SocketAddr> {
        self.http_server
            .as_ref()
            .and_then(|s| s.address())
            .or_else(|| self.ws_server.as_ref().and_then(|s| s.address()))
    }

    fn is_running(&self) -> bool {
        self.http_server.as_ref().is_some_and(|s| s.is_running())
            || self.ws_server.as_ref().is_some_and(|s| s.is_running())
    }

    async fn run(&self, shutdown_token: CancellationToken) -> Result<()> {
        info!(server = %self.name, "Starting combined server");

        let mut servers = JoinSet::new();
        if let Some(http) = self.http_server.clone() {
            let token = shutdown_token.child_token();
            servers.spawn(async move { http.run(token).await });
        }
        if let Some(ws) = self.ws_server.clone() {
            let token = shutdown_token.child_token();
            servers.spawn(async move { ws.run(token).await });
        }
        if servers.is_empty() {
            warn!(server = %self.name, "No protocols configured");
            return Ok(());
        }

        let mut failures = Vec::new();
        tokio::select! {
            _ = shutdown_token.cancelled() => info!(server = %self.name, "Shutdown requested"),
            Some(first) = servers.join_next() => {
                if let Some(e) = exit_failure(first) {
                    error!(server = %self.name, error = %e, "Listener failed");
                    failures.push(e);
                } else {
                    warn!(server = %self.name, "Listener stopped on its own");
                }
                shutdown_token.cancel();
            }
        }

        let drain = async {
            while let Some(exit) = servers.join_next().await {
                if let Some(e) = exit_failure(exit) {
                    failures.push(e);
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!(server = %self.name, "Listeners did not stop in time, aborting");
            servers.abort_all();
        }

        if failures.is_empty() {
            info!(server = %self.name, "All listeners stopped");
        } else {
            warn!(server = %self.name, ?failures, "Listeners stopped with errors");
        }
        Ok(())
    }
}

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn exit_failure(exit: std::result::Result<Result<()>, JoinError>) -> Option<String> {
    match exit {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) => Some(format!("listener task panicked: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_combined_server_shutdown() {
        let config = ServerConfig::new("127.0.0.1", 0, 0);
        let router = health_routes(Arc::new(HealthState::new("test")));

        let server = CombinedServer::new("test", config).with_http_router(router);
        let (handle, token) = server.spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(10), handle).await;
        assert!(result.is_ok(), "Server should shutdown within timeout");
    }

    #[tokio::test]
    async fn test_combined_server_without_protocols_returns() {
        let server = CombinedServer::new("empty", ServerConfig::http_only("127.0.0.1", 0));
        assert!(server.run(CancellationToken::new()).await.is_ok());
    }
}
