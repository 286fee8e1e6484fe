//! Port checks run before the servers start
//!
//! A successful check does not reserve the port; another process may take
//! it before the real bind. The bind itself remains authoritative.

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

/// Fail early if any configured port is already taken
pub async fn validate_ports_available(config: &ServerConfig) -> Result<()> {
    let ports_to_check: Vec<(&str, u16)> = [("HTTP", config.http_port), ("WebSocket", config.websocket_port)]
        .into_iter()
        .filter_map(|(protocol, port)| port.map(|p| (protocol, p)))
        .collect();

    if ports_to_check.is_empty() {
        warn!("No ports configured for server");
        return Ok(());
    }

    for (protocol, port) in ports_to_check {
        validate_port_range(port)?;
        let addr = format!("{}:{}", config.host, port);
        debug!("Checking {} port {}", protocol, port);

        if let Err(e) = TcpListener::bind(&addr).await {
            error!("{} port {} is NOT available: {}", protocol, port, e);
            return Err(ServerError::port_in_use(port, e.to_string()));
        }
    }

    info!("All server ports validated successfully");
    Ok(())
}

/// Returns `true` if binding `host:port` currently fails
pub async fn is_port_in_use(host: &str, port: u16) -> bool {
    TcpListener::bind(format!("{}:{}", host, port)).await.is_err()
}

/// Reject port 0 and warn on privileged ports
pub fn validate_port_range(port: u16) -> Result<()> {
    if port == 0 {
        return Err(ServerError::ConfigError(
            "Port cannot be 0 (ephemeral port assignment not supported for explicit binding)"
                .to_string(),
        ));
    }
    if port < 1024 {
        warn!("Port {} is a privileged port (requires root/admin privileges)", port);
    }
    Ok(())
}
