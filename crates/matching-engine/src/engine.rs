//! Per-book matching engine
//!
//! One [`OrderBookEngine`] owns one trading pair: its order records, the
//! resting lists and history, and the change notifier consumers watch.

use std::collections::HashSet;
use std::sync::Arc;

use common::{BookId, Brand, Direction, OrderId, OrderState, Proposal, ASSET, PRICE};
use config::{BookConfig, SettlementFailurePolicy};
use parking_lot::Mutex;
use settlement::{Escrow, SettlementError, SettlementRequest, TradeLeg};
use tracing::{debug, info, instrument, warn};

use crate::book::Book;
use crate::domain::{BookSnapshot, Order, OrderStateChange, SubmitOutcome};
use crate::error::{MatchingError, Result};
use crate::metrics::BookMetrics;
use crate::notifier::{ChangeNotifier, Versioned};
use crate::projection::{BookOrdersView, ConfiguredKeywords, OrderView, PublicProjector};
use crate::store::{InMemoryOrderStore, OrderStore};

/// The brands a book trades
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookTerms {
    pub asset: Brand,
    pub price: Brand,
}

impl BookTerms {
    pub fn from_config(book: &BookConfig) -> Self {
        Self {
            asset: Brand::new(book.asset.brand.clone()),
            price: Brand::new(book.price.brand.clone()),
        }
    }

    /// Classify `proposal`, or explain why this book cannot accept it
    pub fn check(&self, proposal: &Proposal) -> std::result::Result<Direction, String> {
        let direction = proposal.direction().ok_or_else(|| {
            "proposal must give exactly one of Asset/Price and want the other".to_string()
        })?;
        let brand_of = |keyword: &str| proposal.amount(keyword).map(|a| &a.brand);
        if brand_of(ASSET) != Some(&self.asset) {
            return Err(format!("Asset must be of brand {}", self.asset));
        }
        if brand_of(PRICE) != Some(&self.price) {
            return Err(format!("Price must be of brand {}", self.price));
        }
        Ok(direction)
    }
}

/// Mutable book state, guarded by a synchronous lock never held across an await
struct BookState {
    store: Box<dyn OrderStore>,
    book: Book,
    /// Orders taking part in the submission currently in progress
    in_flight: HashSet<OrderId>,
    /// Transitions not yet published
    changes: Vec<OrderStateChange>,
}

impl BookState {
    fn transition(&mut self, id: OrderId, to: OrderState) -> Result<()> {
        let direction = self.store.get(&id)?.direction;
        let from = self.store.set_state(&id, to)?;
        self.changes.push(OrderStateChange {
            order_id: id,
            direction,
            from,
            to,
        });
        Ok(())
    }

    /// Record a new order and append it to its side of the book
    fn book_order(&mut self, order: Order) -> Result<()> {
        let (id, direction) = (order.id, order.direction);
        self.store.create(order)?;
        self.transition(id, direction.booked_state())?;
        self.book.add(direction, id);
        Ok(())
    }

    /// Move a resting order to history; false if it was not resting
    fn retire(&mut self, id: OrderId, terminal: OrderState) -> Result<bool> {
        let direction = self.store.get(&id)?.direction;
        if !self.book.retire(direction, id, terminal) {
            return Ok(false);
        }
        self.transition(id, terminal)?;
        Ok(true)
    }

    /// Cancel every listed order that is still resting and not in flight
    fn cancel_inactive(&mut self, ids: &[OrderId]) -> Result<usize> {
        let mut cancelled = 0;
        for id in ids {
            if self.in_flight.contains(id) || !self.book.is_resting(id) {
                continue;
            }
            if self.retire(*id, OrderState::Cancelled)? {
                info!(order_id = %id, "Order cancelled: no longer live in escrow");
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    /// First resting counter-order, oldest first, that pairs with `incoming`
    fn find_match(&self, incoming: &Order, live: &HashSet<OrderId>) -> Result<Option<Order>> {
        for id in self.book.resting(incoming.direction.opposite()) {
            if !live.contains(id) || self.in_flight.contains(id) {
                continue;
            }
            let candidate = self.store.get(id)?;
            if incoming.pairs_with(candidate) {
                return Ok(Some(candidate.clone()));
            }
        }
        Ok(None)
    }

    fn orders(&self, ids: &[OrderId]) -> Vec<Order> {
        ids.iter().filter_map(|id| self.store.get(id).ok()).cloned().collect()
    }

    fn history(&self, direction: Direction) -> Vec<Order> {
        self.book
            .history(direction)
            .iter()
            .filter_map(|entry| self.store.get(&entry.order_id).ok())
            .cloned()
            .collect()
    }

    /// Snapshot the book and take the pending transitions with it
    fn snapshot(&mut self) -> BookSnapshot {
        BookSnapshot {
            buy: self.orders(self.book.resting(Direction::Buy)),
            sell: self.orders(self.book.resting(Direction::Sell)),
            buy_history: self.history(Direction::Buy),
            sell_history: self.history(Direction::Sell),
            changes: std::mem::take(&mut self.changes),
        }
    }
}

/// Clears in-flight markers however the submission ends
struct InFlightGuard<'a> {
    state: &'a Mutex<BookState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().in_flight.clear();
    }
}

/// Matching engine for a single book
///
/// CRITICAL PROPERTIES:
/// 1. An order id is in at most one of buy, sell, buy history, sell history
/// 2. A trade only pairs orders with identical Asset and Price amounts
/// 3. Submissions are serialized per book; readers never wait on escrow calls
/// 4. Every committed mutation publishes exactly one new version
pub struct OrderBookEngine {
    book_id: BookId,
    terms: BookTerms,
    policy: SettlementFailurePolicy,
    escrow: Arc<dyn Escrow>,
    state: Mutex<BookState>,
    /// Held across escrow awaits so submissions never interleave
    submissions: tokio::sync::Mutex<()>,
    notifier: ChangeNotifier<BookSnapshot>,
    projector: PublicProjector,
    metrics: BookMetrics,
}

impl std::fmt::Debug for OrderBookEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBookEngine")
            .field("book_id", &self.book_id)
            .finish_non_exhaustive()
    }
}

impl OrderBookEngine {
    pub fn new(book: &BookConfig, policy: SettlementFailurePolicy, escrow: Arc<dyn Escrow>) -> Self {
        Self::with_store(book, policy, escrow, Box::new(InMemoryOrderStore::new()))
    }

    pub fn with_store(
        book: &BookConfig,
        policy: SettlementFailurePolicy,
        escrow: Arc<dyn Escrow>,
        store: Box<dyn OrderStore>,
    ) -> Self {
        Self {
            book_id: book.id.clone(),
            terms: BookTerms::from_config(book),
            policy,
            escrow,
            state: Mutex::new(BookState {
                store,
                book: Book::new(),
                in_flight: HashSet::new(),
                changes: Vec::new(),
            }),
            submissions: tokio::sync::Mutex::new(()),
            notifier: ChangeNotifier::new(BookSnapshot::default()),
            projector: PublicProjector::new(ConfiguredKeywords::from_book(book)),
            metrics: BookMetrics::new(&book.id),
        }
    }

    pub fn book_id(&self) -> &BookId {
        &self.book_id
    }

    pub fn terms(&self) -> &BookTerms {
        &self.terms
    }

    pub fn escrow(&self) -> &Arc<dyn Escrow> {
        &self.escrow
    }

    /// Publish pending transitions, if any, as the next version
    fn commit(&self, state: &mut BookState) {
        if state.changes.is_empty() {
            return;
        }
        let snapshot = state.snapshot();
        let (buys, sells) = (snapshot.buy.len(), snapshot.sell.len());
        let version = self.notifier.publish(snapshot);
        self.metrics.book_published(version, buys, sells);
        debug!(book = %self.book_id, version, "Book version bumped");
    }

    /// Ids in `ids` the escrow still holds
    ///
    /// If the escrow cannot answer every id is assumed live; settlement
    /// re-checks liveness anyway.
    async fn live_among(&self, ids: &[OrderId]) -> HashSet<OrderId> {
        if ids.is_empty() {
            return HashSet::new();
        }
        match self.escrow.offer_statuses(ids).await {
            Ok(statuses) => ids
                .iter()
                .filter(|id| !statuses.inactive.contains(id))
                .copied()
                .collect(),
            Err(e) => {
                warn!(book = %self.book_id, %e, "Offer status query failed, assuming all live");
                ids.iter().copied().collect()
            }
        }
    }

    /// Submit a proposal to the book
    ///
    /// The order is booked, counter-orders that left escrow are cancelled,
    /// and the oldest exact counter-order (if any) is settled against it.
    /// Without `order_id` a fresh id is assigned.
    #[instrument(skip(self, proposal), fields(book = %self.book_id))]
    pub async fn submit(&self, proposal: Proposal, order_id: Option<OrderId>) -> Result<SubmitOutcome> {
        let order_id = order_id.unwrap_or_default();
        self.metrics.order_submitted();

        // Held from the duplicate check until the order is booked or handed
        // back, so a concurrent submission reusing the id cannot slip between
        let _lane = self.submissions.lock().await;

        if self.state.lock().store.contains(&order_id) {
            return Err(MatchingError::DuplicateOrder(order_id));
        }

        let direction = match self.terms.check(&proposal) {
            Ok(direction) => direction,
            Err(reason) => {
                self.metrics.order_rejected();
                debug!(%order_id, %reason, "Proposal rejected");
                if let Err(e) = self.escrow.reject_order(order_id, &reason).await {
                    warn!(%order_id, %e, "Failed to hand rejected proposal back");
                }
                return Err(MatchingError::InvalidProposal(reason));
            }
        };

        let _in_flight = InFlightGuard { state: &self.state };

        let incoming = Order::pending(order_id, direction, proposal);
        let counter_ids = {
            let mut state = self.state.lock();
            state.book_order(incoming.clone())?;
            state.in_flight.insert(order_id);
            state.book.resting(direction.opposite()).to_vec()
        };
        info!(%order_id, %direction, "Order booked");

        let live = self.live_among(&counter_ids).await;

        let resting = {
            let mut state = self.state.lock();
            let gone: Vec<OrderId> = counter_ids.iter().filter(|id| !live.contains(id)).copied().collect();
            let cancelled = state.cancel_inactive(&gone)?;
            if cancelled > 0 {
                self.metrics.orders_cancelled(cancelled);
            }
            match state.find_match(&incoming, &live)? {
                Some(resting) => {
                    state.in_flight.insert(resting.id);
                    resting
                }
                None => {
                    self.commit(&mut state);
                    return Ok(SubmitOutcome::Accepted);
                }
            }
        };

        debug!(%order_id, resting_id = %resting.id, "Match found, settling");
        let request = SettlementRequest {
            incoming: TradeLeg {
                order_id,
                proposal: incoming.proposal.clone(),
            },
            resting: TradeLeg {
                order_id: resting.id,
                proposal: resting.proposal.clone(),
            },
        };

        match self.escrow.settle_trade(request).await {
            Ok(receipt) => {
                {
                    let mut state = self.state.lock();
                    state.retire(resting.id, OrderState::Matched)?;
                    state.retire(order_id, OrderState::Fulfilled)?;
                    self.commit(&mut state);
                }
                self.metrics.trade_settled();
                info!(%order_id, resting_id = %resting.id, trade_id = %receipt.trade_id, "Trade settled");
                Ok(SubmitOutcome::Traded(receipt))
            }
            Err(err) => {
                self.metrics.settlement_failed();
                warn!(%order_id, resting_id = %resting.id, %err, policy = %self.policy, "Settlement failed");
                let withdrawn = self.settlement_failed(order_id, &err)?;
                if withdrawn {
                    if let Err(e) = self.escrow.reject_order(order_id, &err.to_string()).await {
                        warn!(%order_id, %e, "Failed to hand withdrawn order back");
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Apply the failure policy; true if the incoming order was withdrawn
    fn settlement_failed(&self, order_id: OrderId, err: &SettlementError) -> Result<bool> {
        let mut state = self.state.lock();
        let mut cancelled = 0;
        if let SettlementError::OrderNotActive(gone) = err {
            if state.retire(*gone, OrderState::Cancelled)? {
                cancelled += 1;
            }
        }
        let withdrawn = self.policy == SettlementFailurePolicy::Withdraw
            && state.retire(order_id, OrderState::Cancelled)?;
        if withdrawn {
            cancelled += 1;
        }
        if cancelled > 0 {
            self.metrics.orders_cancelled(cancelled);
        }
        self.commit(&mut state);
        Ok(withdrawn)
    }

    /// Cancel resting orders that have left escrow
    ///
    /// Idempotent; returns how many orders were cancelled. Orders taking
    /// part in an in-progress submission are left alone.
    #[instrument(skip(self), fields(book = %self.book_id))]
    pub async fn reconcile(&self) -> Result<usize> {
        let resting: Vec<OrderId> = {
            let state = self.state.lock();
            state
                .book
                .all_resting()
                .filter(|id| !state.in_flight.contains(id))
                .copied()
                .collect()
        };
        if resting.is_empty() {
            return Ok(0);
        }

        let statuses = self.escrow.offer_statuses(&resting).await?;
        if statuses.inactive.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock();
        let cancelled = state.cancel_inactive(&statuses.inactive)?;
        if cancelled > 0 {
            self.metrics.orders_cancelled(cancelled);
            self.commit(&mut state);
        }
        Ok(cancelled)
    }

    pub fn is_resting(&self, id: &OrderId) -> bool {
        self.state.lock().book.is_resting(id)
    }

    /// Latest published snapshot and its version
    pub fn current(&self) -> Versioned<BookSnapshot> {
        self.notifier.current()
    }

    pub fn version(&self) -> u64 {
        self.notifier.version()
    }

    /// Wait for a version newer than `since`
    pub async fn await_change(&self, since: u64) -> Result<Versioned<BookSnapshot>> {
        self.notifier.await_change(since).await
    }

    pub fn project(&self, snapshot: &Versioned<BookSnapshot>) -> BookOrdersView {
        self.projector.snapshot(snapshot)
    }

    /// The four lists and the current change token
    pub fn get_book_orders(&self) -> BookOrdersView {
        let mut view = self.project(&self.current());
        view.changes.clear();
        view
    }

    /// The four lists restricted to `ids`
    pub fn get_order_status(&self, ids: &[OrderId]) -> BookOrdersView {
        let current = self.current();
        let filtered = Versioned {
            version: current.version,
            value: Arc::new(current.value.filtered(ids)),
        };
        self.project(&filtered)
    }

    /// View of a single order while it rests in the book
    pub fn get_offer(&self, id: &OrderId) -> Result<OrderView> {
        let current = self.current();
        current
            .value
            .resting(id)
            .map(|order| self.projector.order(order))
            .ok_or(MatchingError::OrderNotFound(*id))
    }

    /// Reject every pending and future `await_change`
    pub fn close(&self) {
        info!(book = %self.book_id, "Closing book notifier");
        self.notifier.close();
    }
}
