//! Server error types

use std::io;
use thiserror::Error;

/// Result type alias for server operations
#[allow(clippy::result_large_err)]
pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Port {port} is already in use: {reason}")]
    PortInUse { port: u16, reason: String },

    #[error("Failed to bind to address {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid server configuration: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a bind error from an address string and IO error
    pub fn bind(address: impl Into<String>, source: io::Error) -> Self {
        Self::BindError {
            address: address.into(),
            source,
        }
    }

    /// Create a port in use error
    pub fn port_in_use(port: u16, reason: impl Into<String>) -> Self {
        Self::PortInUse {
            port,
            reason: reason.into(),
        }
    }
}
