//! WebSocket server implementation using Tokio-Tungstenite
//!
//! Each connection gets a unique id and an outbound channel. The
//! [`MessageHandler`] answers requests directly and may keep the channel
//! to push unsolicited messages (book updates) later.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use observability::ServerMetrics;
use parking_lot::RwLock as SyncRwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::traits::Server;

/// A unique identifier for each WebSocket connection
pub type ConnectionId = u64;

/// Sending half of a connection's outbound queue
///
/// A send error means the connection is gone.
pub type Outbound = mpsc::UnboundedSender<Message>;

/// Information about an active WebSocket connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub connected_at: std::time::Instant,
}

/// Application logic behind the WebSocket server
///
/// ```ignore
/// struct Echo;
///
/// #[async_trait]
/// impl MessageHandler for Echo {
///     async fn handle(&self, _conn_id: ConnectionId, message: Message) -> Option<Message> {
///         message.is_text().then_some(message)
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message and optionally return a direct response
    async fn handle(&self, conn_id: ConnectionId, message: Message) -> Option<Message>;

    /// Called once the upgrade completes, before any message is handled
    ///
    /// `outbound` stays valid until the connection closes.
    async fn on_connect(&self, _conn_id: ConnectionId, _peer_addr: SocketAddr, _outbound: Outbound) {}

    /// Called after the connection closed for any reason
    async fn on_disconnect(&self, _conn_id: ConnectionId) {}
}

/// WebSocket server with connection tracking and graceful drain
#[derive(Clone)]
pub struct WebSocketServer {
    config: ServerConfig,
    running: Arc<AtomicBool>,
    bound_addr: Arc<SyncRwLock<Option<SocketAddr>>>,
    next_conn_id: Arc<AtomicU64>,
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionInfo>>>,
    handler: Arc<dyn MessageHandler>,
    metrics: ServerMetrics,
}

impl WebSocketServer {
    pub fn with_handler<H: MessageHandler + 'static>(config: ServerConfig, handler: H) -> Self {
        Self::with_shared_handler(config, Arc::new(handler))
    }

    pub fn with_shared_handler(config: ServerConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            bound_addr: Arc::new(SyncRwLock::new(None)),
            next_conn_id: Arc::new(AtomicU64::new(1)),
            connections: Arc::new(RwLock::new(HashMap::new())),
            handler,
            metrics: ServerMetrics::new("websocket"),
        }
    }

    fn bind_addr(&self) -> Result<SocketAddr> {
        self.config
            .websocket_addr()
            .ok_or_else(|| ServerError::ConfigError("WebSocket port not configured".into()))?
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn active_connections(&self) -> Vec<ConnectionInfo> {
        self.connections.read().await.values().cloned().collect()
    }

    fn next_connection_id(&self) -> ConnectionId {
        self.next_conn_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn register_connection(&self, id: ConnectionId, peer_addr: SocketAddr, outbound: Outbound) {
        let info = ConnectionInfo {
            id,
            peer_addr,
            connected_at: std::time::Instant::now(),
        };
        self.connections.write().await.insert(id, info);
        self.metrics.connection_opened();
        self.handler.on_connect(id, peer_addr, outbound).await;
    }

    async fn unregister_connection(&self, id: ConnectionId) {
        self.connections.write().await.remove(&id);
        self.metrics.connection_closed();
        self.handler.on_disconnect(id).await;
    }

    async fn handle_connection(
        &self,
        conn_id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        conn_token: CancellationToken,
    ) -> Result<()> {
        let ws_stream = accept_async(stream).await.map_err(ServerError::WebSocket)?;
        debug!(conn_id, %peer_addr, "WebSocket connection established");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        self.register_connection(conn_id, peer_addr, outbound.clone()).await;

        loop {
            tokio::select! {
                _ = conn_token.cancelled() => {
                    debug!(conn_id, "Connection shutting down due to server shutdown");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }

                Some(pushed) = outbound_rx.recv() => {
                    if let Err(e) = ws_sender.send(pushed).await {
                        warn!(conn_id, %e, "Failed to push WebSocket message");
                        break;
                    }
                    self.metrics.message_sent();
                }

                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(message)) => {
                            if message.is_close() {
                                debug!(conn_id, "WebSocket client disconnected gracefully");
                                break;
                            }
                            self.metrics.message_received();

                            if let Some(response) = self.handler.handle(conn_id, message).await {
                                // Responses share the outbound queue so they stay
                                // ordered with pushes queued by the handler.
                                if outbound.send(response).is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!(conn_id, %e, "WebSocket error");
                            break;
                        }
                        None => {
                            debug!(conn_id, "WebSocket stream ended");
                            break;
                        }
                    }
                }
            }
        }

        self.unregister_connection(conn_id).await;

        debug!(conn_id, "WebSocket connection closed");
        Ok(())
    }
}

#[async_trait]
impl Server for WebSocketServer {
    fn name(&self) -> &str {
        "websocket"
    }

    fn address(&self) -> Option<SocketAddr> {
        *self.bound_addr.read()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run(&self, shutdown_token: CancellationToken) -> Result<()> {
        let addr = self.bind_addr()?;

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::bind(addr.to_string(), e))?;

        let local_addr = listener.local_addr().map_err(ServerError::Io)?;
        *self.bound_addr.write() = Some(local_addr);

        info!(%local_addr, "WebSocket server listening");

        self.running.store(true, Ordering::SeqCst);

        let connections = TaskTracker::new();
        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = shutdown_token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(%e, "Failed to accept WebSocket connection");
                        continue;
                    }
                },
            };

            let conn_id = self.next_connection_id();
            let server = self.clone();
            let conn_token = shutdown_token.child_token();
            connections.spawn(async move {
                if let Err(e) = server.handle_connection(conn_id, stream, peer_addr, conn_token).await {
                    error!(conn_id, %e, "WebSocket connection error");
                }
            });
        }

        connections.close();
        if !connections.is_empty() {
            info!(open = connections.len(), "Draining WebSocket connections");
            if tokio::time::timeout(DRAIN_TIMEOUT, connections.wait()).await.is_err() {
                warn!(open = connections.len(), "WebSocket connections still open after drain timeout");
            }
        }

        self.running.store(false, Ordering::SeqCst);
        *self.bound_addr.write() = None;
        info!("WebSocket server stopped");
        Ok(())
    }
}

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ServerExt;
    use parking_lot::Mutex;
    use tokio_tungstenite::connect_async;

    /// Echoes text and pushes a greeting on connect
    #[derive(Default)]
    struct GreetingEcho {
        disconnected: Mutex<Vec<ConnectionId>>,
    }

    #[async_trait]
    impl MessageHandler for GreetingEcho {
        async fn handle(&self, _conn_id: ConnectionId, message: Message) -> Option<Message> {
            message.is_text().then_some(message)
        }

        async fn on_connect(&self, conn_id: ConnectionId, _peer_addr: SocketAddr, outbound: Outbound) {
            let _ = outbound.send(Message::Text(format!("hello {}", conn_id)));
        }

        async fn on_disconnect(&self, conn_id: ConnectionId) {
            self.disconnected.lock().push(conn_id);
        }
    }

    async fn wait_for_address(server: &WebSocketServer) -> SocketAddr {
        for _ in 0..100 {
            if let Some(addr) = server.address() {
                return addr;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("WebSocket server did not bind");
    }

    #[tokio::test]
    async fn test_push_then_echo() {
        let handler = Arc::new(GreetingEcho::default());
        let server = WebSocketServer::with_shared_handler(
            ServerConfig::websocket_only("127.0.0.1", 0),
            handler.clone(),
        );
        let probe = server.clone();
        let (handle, token) = server.spawn();
        let addr = wait_for_address(&probe).await;

        let (mut client, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let greeting = client.next().await.unwrap().unwrap();
        assert_eq!(greeting, Message::Text("hello 1".to_string()));

        client.send(Message::Text("ping".to_string())).await.unwrap();
        let echoed = client.next().await.unwrap().unwrap();
        assert_eq!(echoed, Message::Text("ping".to_string()));
        assert_eq!(probe.connection_count().await, 1);

        client.close(None).await.unwrap();
        for _ in 0..100 {
            if probe.connection_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*handler.disconnected.lock(), vec![1]);

        token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.is_ok(), "Server should shutdown within timeout");
    }

    #[test]
    fn test_websocket_server_name() {
        let server = WebSocketServer::with_handler(
            ServerConfig::websocket_only("127.0.0.1", 7080),
            GreetingEcho::default(),
        );
        assert_eq!(server.name(), "websocket");
    }
}
