//! Metrics for the matching engine
//!
//! Recorded through the `metrics` facade; every series carries a `book` label.
//!
//! * `exchange_orders_submitted_total` - proposals received, valid or not
//! * `exchange_orders_rejected_total` - proposals refused before booking
//! * `exchange_trades_total` - settled matches
//! * `exchange_settlement_failures_total` - matches the escrow refused
//! * `exchange_orders_cancelled_total` - orders moved to history as cancelled
//! * `exchange_resting_orders{side}` - current book depth
//! * `exchange_book_version` - latest published version

use common::BookId;
use metrics::{counter, gauge, Counter, Gauge};

#[derive(Clone)]
pub struct BookMetrics {
    submitted: Counter,
    rejected: Counter,
    trades: Counter,
    settlement_failures: Counter,
    cancelled: Counter,
    resting_buy: Gauge,
    resting_sell: Gauge,
    version: Gauge,
}

impl BookMetrics {
    pub fn new(book_id: &BookId) -> Self {
        let book = book_id.clone();
        Self {
            submitted: counter!("exchange_orders_submitted_total", "book" => book.clone()),
            rejected: counter!("exchange_orders_rejected_total", "book" => book.clone()),
            trades: counter!("exchange_trades_total", "book" => book.clone()),
            settlement_failures: counter!("exchange_settlement_failures_total", "book" => book.clone()),
            cancelled: counter!("exchange_orders_cancelled_total", "book" => book.clone()),
            resting_buy: gauge!("exchange_resting_orders", "book" => book.clone(), "side" => "buy"),
            resting_sell: gauge!("exchange_resting_orders", "book" => book.clone(), "side" => "sell"),
            version: gauge!("exchange_book_version", "book" => book),
        }
    }

    pub fn order_submitted(&self) {
        self.submitted.increment(1);
    }

    pub fn order_rejected(&self) {
        self.rejected.increment(1);
    }

    pub fn trade_settled(&self) {
        self.trades.increment(1);
    }

    pub fn settlement_failed(&self) {
        self.settlement_failures.increment(1);
    }

    pub fn orders_cancelled(&self, count: usize) {
        self.cancelled.increment(count as u64);
    }

    /// Record depth and version after a publish
    pub fn book_published(&self, version: u64, buys: usize, sells: usize) {
        self.version.set(version as f64);
        self.resting_buy.set(buys as f64);
        self.resting_sell.set(sells as f64);
    }
}
