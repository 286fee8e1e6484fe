//! In-memory order store

use std::collections::HashMap;

use common::{OrderId, OrderState};
use tracing::debug;

use crate::domain::Order;
use crate::store::traits::{OrderStore, StoreError, StoreResult};

/// In-memory store for order records
///
/// Fast but non-persistent - records are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: HashMap<OrderId, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn create(&mut self, order: Order) -> StoreResult<()> {
        if self.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateOrder(order.id));
        }
        debug!(order_id = %order.id, direction = %order.direction, "Order recorded");
        self.orders.insert(order.id, order);
        Ok(())
    }

    fn get(&self, id: &OrderId) -> StoreResult<&Order> {
        self.orders.get(id).ok_or(StoreError::OrderNotFound(*id))
    }

    fn set_state(&mut self, id: &OrderId, state: OrderState) -> StoreResult<OrderState> {
        let order = self.orders.get_mut(id).ok_or(StoreError::OrderNotFound(*id))?;
        Ok(std::mem::replace(&mut order.state, state))
    }

    fn len(&self) -> usize {
        self.orders.len()
    }
}
