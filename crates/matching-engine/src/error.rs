//! Matching engine error types

use common::{BookId, OrderId};
use settlement::SettlementError;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while submitting, matching or observing orders
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchingError {
    /// Malformed give/want shape or brands foreign to the book
    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    /// Order id collision
    #[error("Duplicate order: {0}")]
    DuplicateOrder(OrderId),

    /// Lookup of an unknown or inactive order
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Book not found: {0}")]
    BookNotFound(BookId),

    /// Escrow failure during trade execution; no trade was recorded
    #[error("Settlement failed: {0}")]
    Settlement(#[from] SettlementError),

    /// The book is shutting down and will publish no further versions
    #[error("Change notifier closed")]
    NotifierClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for MatchingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateOrder(id) => MatchingError::DuplicateOrder(id),
            StoreError::OrderNotFound(id) => MatchingError::OrderNotFound(id),
        }
    }
}

impl MatchingError {
    /// True for errors caused by the caller's input rather than a fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MatchingError::InvalidProposal(_)
                | MatchingError::DuplicateOrder(_)
                | MatchingError::OrderNotFound(_)
                | MatchingError::BookNotFound(_)
        )
    }
}

/// Result type for matching engine operations
pub type Result<T> = std::result::Result<T, MatchingError>;
