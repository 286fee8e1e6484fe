//! Settlement Service for Simplex
//!
//! This crate defines the escrow capability the matching engine calls
//! to learn whether an order is still live, to move assets once a match
//! is found, and to hand back proposals that were rejected.
//!
//! The engine never looks inside the escrow: it only sees the [`Escrow`]
//! trait. [`InMemoryEscrow`] is a simulated implementation used by the
//! binary and by tests.

pub mod error;
pub mod escrow;
pub mod memory;

pub use error::SettlementError;
pub use escrow::{Escrow, OfferStatuses, SettlementReceipt, SettlementRequest, TradeLeg};
pub use memory::InMemoryEscrow;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, SettlementError>;
