//! Settlement error types

use common::OrderId;
use thiserror::Error;

/// Errors that can occur during settlement operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// Settlement failed
    #[error("Settlement failed: {0}")]
    SettlementFailed(String),

    /// One leg of the trade has already left escrow
    #[error("Order is no longer active: {0}")]
    OrderNotActive(OrderId),

    /// The escrow refused the proposal
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// The escrow could not be reached
    #[error("Escrow unavailable: {0}")]
    Unavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
