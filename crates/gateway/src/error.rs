//! Gateway error types

use common::BookId;
use matching_engine::MatchingError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The connection has no open session to subscribe from
    #[error("Subscriptions not initialised for connection {0}")]
    SubscriptionState(u64),

    /// The connection went away before a reply could be delivered
    #[error("Connection {0} is closed")]
    ConnectionClosed(u64),

    /// The request names a book other than the pinned default
    #[error("Book {requested} is not served here; this gateway is pinned to {pinned}")]
    BookMismatch { requested: BookId, pinned: BookId },

    /// The request names no book and there is no default to fall back to
    #[error("A book id is required")]
    MissingBook,

    #[error(transparent)]
    Matching(#[from] MatchingError),

    /// Unparseable client request
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl GatewayError {
    /// True when the request itself was at fault
    pub fn is_client_error(&self) -> bool {
        match self {
            GatewayError::Matching(e) => e.is_client_error(),
            GatewayError::ConnectionClosed(_) | GatewayError::Serialization(_) | GatewayError::Internal(_) => false,
            _ => true,
        }
    }
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use settlement::SettlementError;

    #[test]
    fn test_client_errors() {
        assert!(GatewayError::MissingBook.is_client_error());
        assert!(GatewayError::Matching(MatchingError::InvalidProposal("no give".into())).is_client_error());
        assert!(!GatewayError::Internal("boom".into()).is_client_error());
    }

    #[test]
    fn test_settlement_failure_is_not_client_error() {
        let err = GatewayError::Matching(MatchingError::Settlement(SettlementError::Unavailable(
            "escrow down".into(),
        )));
        assert!(!err.is_client_error());
    }
}
