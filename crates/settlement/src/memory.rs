//! In-memory escrow implementation
//!
//! Every order is considered live until it is settled, rejected or
//! withdrawn through [`InMemoryEscrow::withdraw`]. Settlement failures can
//! be injected for testing the engine's failure path.

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, TradeId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::SettlementError;
use crate::escrow::{Escrow, OfferStatuses, SettlementReceipt, SettlementRequest};
use crate::Result;

const EXIT_CHANNEL_CAPACITY: usize = 1024;

/// In-memory escrow
///
/// Fast and non-persistent. Custody state is lost on restart.
pub struct InMemoryEscrow {
    /// Orders that have left escrow
    exited: RwLock<HashSet<OrderId>>,
    /// Completed settlements, oldest first
    receipts: RwLock<Vec<SettlementReceipt>>,
    /// When set, every settlement fails with this reason
    injected_failure: Mutex<Option<String>>,
    exits: broadcast::Sender<OrderId>,
}

impl InMemoryEscrow {
    /// Create a new in-memory escrow
    pub fn new() -> Self {
        let (exits, _) = broadcast::channel(EXIT_CHANNEL_CAPACITY);
        Self {
            exited: RwLock::new(HashSet::new()),
            receipts: RwLock::new(Vec::new()),
            injected_failure: Mutex::new(None),
            exits,
        }
    }

    /// Withdraw an order from escrow without trading
    ///
    /// Simulates a wallet-level cancellation or an expiry. Returns false if
    /// the order had already exited.
    pub fn withdraw(&self, order_id: OrderId) -> bool {
        let newly_exited = self.exited.write().insert(order_id);
        if newly_exited {
            info!(order_id = %order_id, "Order withdrawn from escrow");
            let _ = self.exits.send(order_id);
        }
        newly_exited
    }

    /// Make every subsequent settlement fail with `reason`
    pub fn fail_settlements(&self, reason: impl Into<String>) {
        *self.injected_failure.lock() = Some(reason.into());
    }

    /// Stop injecting settlement failures
    pub fn clear_failures(&self) {
        *self.injected_failure.lock() = None;
    }

    /// Whether `order_id` has left escrow
    pub fn has_exited(&self, order_id: &OrderId) -> bool {
        self.exited.read().contains(order_id)
    }

    /// All completed settlements
    pub fn receipts(&self) -> Vec<SettlementReceipt> {
        self.receipts.read().clone()
    }

    fn exit(&self, order_id: OrderId) {
        if self.exited.write().insert(order_id) {
            let _ = self.exits.send(order_id);
        }
    }
}

impl Default for InMemoryEscrow {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Escrow for InMemoryEscrow {
    async fn offer_statuses(&self, ids: &[OrderId]) -> Result<OfferStatuses> {
        let exited = self.exited.read();
        let (inactive, active): (Vec<OrderId>, Vec<OrderId>) =
            ids.iter().partition(|id| exited.contains(id));
        Ok(OfferStatuses { active, inactive })
    }

    async fn settle_trade(&self, request: SettlementRequest) -> Result<SettlementReceipt> {
        let SettlementRequest { incoming, resting } = request;

        if let Some(reason) = self.injected_failure.lock().clone() {
            warn!(
                incoming = %incoming.order_id,
                resting = %resting.order_id,
                %reason,
                "Injected settlement failure"
            );
            return Err(SettlementError::SettlementFailed(reason));
        }

        {
            let exited = self.exited.read();
            for leg in [&incoming, &resting] {
                if exited.contains(&leg.order_id) {
                    return Err(SettlementError::OrderNotActive(leg.order_id));
                }
            }
        }

        if !incoming.proposal.satisfies(&resting.proposal)
            || !resting.proposal.satisfies(&incoming.proposal)
        {
            return Err(SettlementError::SettlementFailed(
                "offers do not satisfy each other".to_string(),
            ));
        }

        let receipt = SettlementReceipt {
            trade_id: TradeId::new(),
            payout: resting.proposal.give.clone(),
            settled_at: Utc::now(),
        };

        self.exit(incoming.order_id);
        self.exit(resting.order_id);
        self.receipts.write().push(receipt.clone());

        debug!(
            trade_id = %receipt.trade_id,
            incoming = %incoming.order_id,
            resting = %resting.order_id,
            "Trade settled"
        );

        Ok(receipt)
    }

    async fn reject_order(&self, order_id: OrderId, reason: &str) -> Result<()> {
        debug!(order_id = %order_id, reason, "Returning rejected proposal to owner");
        self.exit(order_id);
        Ok(())
    }

    fn exit_events(&self) -> Option<broadcast::Receiver<OrderId>> {
        Some(self.exits.subscribe())
    }
}
