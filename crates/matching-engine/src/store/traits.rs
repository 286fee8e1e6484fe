//! Store traits for the matching engine

use common::{OrderId, OrderState};

use crate::domain::Order;

/// Errors that can occur in the store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Duplicate order: {0}")]
    DuplicateOrder(OrderId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for order records
///
/// Calls happen under the book's state lock, so implementations are
/// synchronous and need no interior locking. State transitions are not
/// validated here; the engine owns the order lifecycle.
pub trait OrderStore: Send + Sync {
    /// Record a new order; fails if the id is already known
    fn create(&mut self, order: Order) -> StoreResult<()>;

    fn get(&self, id: &OrderId) -> StoreResult<&Order>;

    /// Overwrite the state, returning the previous one
    fn set_state(&mut self, id: &OrderId, state: OrderState) -> StoreResult<OrderState>;

    fn contains(&self, id: &OrderId) -> bool {
        self.get(id).is_ok()
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
