//! Domain types for the matching engine

use chrono::{DateTime, Utc};
use common::{BrandedAmount, Direction, OrderId, OrderState, Proposal, ASSET, PRICE};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use settlement::SettlementReceipt;

/// One participant's limit order as recorded by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub direction: Direction,
    pub proposal: Proposal,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// A freshly recorded order, not yet booked
    pub fn pending(id: OrderId, direction: Direction, proposal: Proposal) -> Self {
        Self {
            id,
            direction,
            proposal,
            state: OrderState::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn asset(&self) -> Option<&BrandedAmount> {
        self.proposal.amount(ASSET)
    }

    pub fn price(&self) -> Option<&BrandedAmount> {
        self.proposal.amount(PRICE)
    }

    /// Same asset and price quantities on both sides, and each covers the other
    pub fn pairs_with(&self, other: &Order) -> bool {
        self.direction != other.direction
            && self.asset().is_some()
            && self.asset() == other.asset()
            && self.price().is_some()
            && self.price() == other.price()
            && self.proposal.satisfies(&other.proposal)
            && other.proposal.satisfies(&self.proposal)
    }
}

/// A state transition committed as part of a book version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStateChange {
    pub order_id: OrderId,
    pub direction: Direction,
    pub from: OrderState,
    pub to: OrderState,
}

/// Everything the book looks like at one version
///
/// History lists carry orders in the terminal state they reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookSnapshot {
    pub buy: Vec<Order>,
    pub sell: Vec<Order>,
    pub buy_history: Vec<Order>,
    pub sell_history: Vec<Order>,
    /// Transitions committed since the previous version
    pub changes: Vec<OrderStateChange>,
}

impl BookSnapshot {
    /// Keep only the orders in `ids`
    pub fn filtered(&self, ids: &[OrderId]) -> Self {
        let keep = |orders: &[Order]| -> Vec<Order> {
            orders.iter().filter(|o| ids.contains(&o.id)).cloned().collect()
        };
        Self {
            buy: keep(&self.buy),
            sell: keep(&self.sell),
            buy_history: keep(&self.buy_history),
            sell_history: keep(&self.sell_history),
            changes: Vec::new(),
        }
    }

    pub fn resting(&self, id: &OrderId) -> Option<&Order> {
        self.buy.iter().chain(self.sell.iter()).find(|o| o.id == *id)
    }
}

/// Result of a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// No counterparty yet; the order rests in the book
    Accepted,
    /// Matched and settled immediately
    Traded(SettlementReceipt),
}

impl SubmitOutcome {
    pub fn is_traded(&self) -> bool {
        matches!(self, SubmitOutcome::Traded(_))
    }
}

impl Serialize for SubmitOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            SubmitOutcome::Accepted => map.serialize_entry("accepted", &true)?,
            SubmitOutcome::Traded(receipt) => map.serialize_entry("traded", receipt)?,
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Brand;

    fn simoleans(v: u64) -> BrandedAmount {
        BrandedAmount::new(Brand::new("simoleans"), v)
    }

    fn moola(v: u64) -> BrandedAmount {
        BrandedAmount::new(Brand::new("moola"), v)
    }

    #[test]
    fn test_pairs_requires_exact_amounts() {
        let sell = Order::pending(OrderId::new(), Direction::Sell, Proposal::sell(simoleans(9), moola(5)));
        let buy = Order::pending(OrderId::new(), Direction::Buy, Proposal::buy(simoleans(9), moola(5)));
        let richer = Order::pending(OrderId::new(), Direction::Buy, Proposal::buy(simoleans(9), moola(6)));

        assert!(sell.pairs_with(&buy));
        assert!(buy.pairs_with(&sell));
        // A better price is still not an exact match
        assert!(!sell.pairs_with(&richer));
        assert!(!sell.pairs_with(&sell.clone()));
    }

    #[test]
    fn test_outcome_wire_shape() {
        let json = serde_json::to_value(SubmitOutcome::Accepted).unwrap();
        assert_eq!(json, serde_json::json!({ "accepted": true }));
    }
}
