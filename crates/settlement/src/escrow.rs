//! Escrow capability trait
//!
//! This module defines the interface the matching engine consumes. It is
//! the only way the engine touches custody: liveness queries, trade
//! settlement and rejection of malformed proposals.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BrandedAmount, Keyword, OrderId, Proposal, TradeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

use crate::Result;

/// Liveness partition of a batch of order ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferStatuses {
    pub active: Vec<OrderId>,
    pub inactive: Vec<OrderId>,
}

impl OfferStatuses {
    pub fn is_active(&self, id: &OrderId) -> bool {
        self.active.contains(id)
    }
}

/// One side of a trade handed to the escrow
#[derive(Debug, Clone)]
pub struct TradeLeg {
    pub order_id: OrderId,
    pub proposal: Proposal,
}

/// A matched pair to settle
#[derive(Debug, Clone)]
pub struct SettlementRequest {
    /// The order that arrived and found a match
    pub incoming: TradeLeg,
    /// The order that was already resting in the book
    pub resting: TradeLeg,
}

/// Proof of a completed settlement, returned to the submitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub trade_id: TradeId,
    /// What the incoming order received, by keyword
    pub payout: BTreeMap<Keyword, BrandedAmount>,
    pub settled_at: DateTime<Utc>,
}

/// External escrow/payment capability
///
/// Implementations must be safe to call concurrently. None of these calls
/// are made while the engine holds a book's state lock.
#[async_trait]
pub trait Escrow: Send + Sync {
    /// Partition `ids` into those still live in escrow and those that exited
    async fn offer_statuses(&self, ids: &[OrderId]) -> Result<OfferStatuses>;

    /// Move the assets for a matched pair
    ///
    /// On `Ok` both orders have left escrow. On `Err` nothing moved.
    async fn settle_trade(&self, request: SettlementRequest) -> Result<SettlementReceipt>;

    /// Hand a rejected proposal back to its owner
    async fn reject_order(&self, order_id: OrderId, reason: &str) -> Result<()>;

    /// Stream of order ids that left escrow, if the implementation can push them
    ///
    /// When `None`, consumers fall back to periodic polling.
    fn exit_events(&self) -> Option<broadcast::Receiver<OrderId>> {
        None
    }
}
