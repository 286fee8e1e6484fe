//! Prometheus metrics infrastructure
//!
//! Domain crates record through the `metrics` facade directly. This module
//! installs the exporter and offers a small helper for the transport
//! servers.

use metrics::{counter, gauge, Counter, Gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize the Prometheus metrics exporter
///
/// Starts an HTTP listener on `port` serving `/metrics`.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// Per-server connection and message metrics
///
/// * `server_active_connections` - open connections
/// * `server_connections_total` - connections accepted since start
/// * `server_messages_received_total` / `server_messages_sent_total` - frames
#[derive(Clone)]
pub struct ServerMetrics {
    active_connections: Gauge,
    connections_total: Counter,
    messages_received: Counter,
    messages_sent: Counter,
    server_name: String,
}

impl ServerMetrics {
    /// Create metrics for a specific server (e.g. "http", "websocket")
    pub fn new(server_name: &str) -> Self {
        let name = server_name.to_string();

        Self {
            active_connections: gauge!("server_active_connections", "server" => name.clone()),
            connections_total: counter!("server_connections_total", "server" => name.clone()),
            messages_received: counter!("server_messages_received_total", "server" => name.clone()),
            messages_sent: counter!("server_messages_sent_total", "server" => name.clone()),
            server_name: name,
        }
    }

    /// Call when a connection is accepted
    pub fn connection_opened(&self) {
        self.connections_total.increment(1);
        self.active_connections.increment(1.0);
    }

    /// Call when a connection is closed
    pub fn connection_closed(&self) {
        self.active_connections.decrement(1.0);
    }

    pub fn message_received(&self) {
        self.messages_received.increment(1);
    }

    pub fn message_sent(&self) {
        self.messages_sent.increment(1);
    }

    /// Get the server name
    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_metrics_without_recorder() {
        // With no recorder installed every handle is a no-op
        let metrics = ServerMetrics::new("websocket");
        metrics.connection_opened();
        metrics.message_received();
        metrics.message_sent();
        metrics.connection_closed();
        assert_eq!(metrics.server_name(), "websocket");
    }
}
