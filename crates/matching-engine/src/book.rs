//! Resting order lists and history for one trading pair
//!
//! CRITICAL PROPERTIES:
//! - An order id appears in at most one of the four lists
//! - Resting lists keep arrival order; scans go oldest first
//! - An order is appended to history at most once

use std::collections::HashSet;

use common::{Direction, OrderId, OrderState};

/// An order that left the book and how it left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry {
    pub order_id: OrderId,
    pub state: OrderState,
}

#[derive(Debug, Default)]
pub struct Book {
    buy: Vec<OrderId>,
    sell: Vec<OrderId>,
    buy_history: Vec<HistoryEntry>,
    sell_history: Vec<HistoryEntry>,
    retired: HashSet<OrderId>,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resting(&self, direction: Direction) -> &[OrderId] {
        match direction {
            Direction::Buy => &self.buy,
            Direction::Sell => &self.sell,
        }
    }

    pub fn history(&self, direction: Direction) -> &[HistoryEntry] {
        match direction {
            Direction::Buy => &self.buy_history,
            Direction::Sell => &self.sell_history,
        }
    }

    fn resting_mut(&mut self, direction: Direction) -> &mut Vec<OrderId> {
        match direction {
            Direction::Buy => &mut self.buy,
            Direction::Sell => &mut self.sell,
        }
    }

    pub fn is_resting(&self, id: &OrderId) -> bool {
        self.buy.contains(id) || self.sell.contains(id)
    }

    /// Every resting id, buys first
    pub fn all_resting(&self) -> impl Iterator<Item = &OrderId> {
        self.buy.iter().chain(self.sell.iter())
    }

    /// Append to the back of its side; a no-op for an id already known
    pub fn add(&mut self, direction: Direction, id: OrderId) -> bool {
        if self.is_resting(&id) || self.retired.contains(&id) {
            return false;
        }
        self.resting_mut(direction).push(id);
        true
    }

    pub fn remove(&mut self, direction: Direction, id: &OrderId) -> bool {
        let list = self.resting_mut(direction);
        match list.iter().position(|o| o == id) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Move a resting order into history with a terminal state
    ///
    /// Returns false, changing nothing, if the order is not resting on
    /// `direction` or was already retired.
    pub fn retire(&mut self, direction: Direction, id: OrderId, state: OrderState) -> bool {
        if self.retired.contains(&id) || !self.remove(direction, &id) {
            return false;
        }
        self.retired.insert(id);
        let entry = HistoryEntry { order_id: id, state };
        match direction {
            Direction::Buy => self.buy_history.push(entry),
            Direction::Sell => self.sell_history.push(entry),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retire_moves_once() {
        let mut book = Book::new();
        let id = OrderId::new();
        assert!(book.add(Direction::Sell, id));

        assert!(book.retire(Direction::Sell, id, OrderState::Cancelled));
        assert!(!book.retire(Direction::Sell, id, OrderState::Matched));
        assert!(!book.add(Direction::Sell, id));

        assert!(book.resting(Direction::Sell).is_empty());
        assert_eq!(
            book.history(Direction::Sell),
            &[HistoryEntry { order_id: id, state: OrderState::Cancelled }]
        );
    }

    #[test]
    fn test_retire_wrong_side_is_noop() {
        let mut book = Book::new();
        let id = OrderId::new();
        book.add(Direction::Buy, id);

        assert!(!book.retire(Direction::Sell, id, OrderState::Matched));
        assert_eq!(book.resting(Direction::Buy), &[id]);
        assert!(book.history(Direction::Sell).is_empty());
    }

    #[test]
    fn test_arrival_order_preserved() {
        let mut book = Book::new();
        let ids: Vec<_> = (0..3).map(|_| OrderId::new()).collect();
        for id in &ids {
            book.add(Direction::Buy, *id);
        }
        book.remove(Direction::Buy, &ids[1]);
        assert_eq!(book.resting(Direction::Buy), &[ids[0], ids[2]]);
    }
}
