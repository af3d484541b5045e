use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shared::{OrderId, OrderStatus, ShopError, UserId};
use std::collections::HashMap;

use crate::models::{NewOrder, Order};

#[derive(Default)]
struct StoreState {
    orders: Vec<Order>,
    index: HashMap<OrderId, usize>,
    last_id: OrderId,
}

/// In-memory order table.
///
/// Readers always get copies taken under the lock, so a status change and its
/// timestamps are seen together or not at all.
#[derive(Default)]
pub struct OrderStore {
    state: RwLock<StoreState>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new `Pending` order, assigning the next id and the order number.
    pub fn insert(&self, new_order: NewOrder) -> Order {
        let now = Utc::now();
        let mut state = self.state.write();
        state.last_id += 1;
        let id = state.last_id;

        let order = Order {
            id,
            user_id: new_order.user_id,
            order_number: order_number(now, id),
            status: OrderStatus::Pending,
            items: new_order.items,
            total_amount: new_order.total_amount,
            shipping_address: new_order.shipping_address,
            payment_method: new_order.payment_method,
            created_at: now,
            updated_at: now,
            shipped_at: None,
            delivered_at: None,
        };

        let position = state.orders.len();
        state.index.insert(id, position);
        state.orders.push(order.clone());
        order
    }

    pub fn get_by_id(&self, id: OrderId) -> Option<Order> {
        let state = self.state.read();
        state.index.get(&id).map(|&position| state.orders[position].clone())
    }

    pub fn list_by_user(&self, user_id: UserId) -> Vec<Order> {
        self.state
            .read()
            .orders
            .iter()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn list_all(&self) -> Vec<Order> {
        self.state.read().orders.clone()
    }

    /// A window of the orders in insertion order, plus the total count.
    pub fn page(&self, skip: usize, take: usize) -> (Vec<Order>, usize) {
        let state = self.state.read();
        let orders = state.orders.iter().skip(skip).take(take).cloned().collect();
        (orders, state.orders.len())
    }

    pub fn len(&self) -> usize {
        self.state.read().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, ShopError> {
        self.update_status_if(id, status, |_| Ok(()))
    }

    /// Applies a transition only if `guard` accepts the current order; both happen under one write lock.
    pub fn update_status_if<G>(
        &self,
        id: OrderId,
        status: OrderStatus,
        guard: G,
    ) -> Result<Order, ShopError>
    where
        G: FnOnce(&Order) -> Result<(), ShopError>,
    {
        let mut state = self.state.write();
        let position = *state
            .index
            .get(&id)
            .ok_or_else(|| ShopError::order_not_found(id))?;
        let order = &mut state.orders[position];

        guard(order)?;
        order.transition_to(status, Utc::now())?;
        Ok(order.clone())
    }
}

fn order_number(created_at: DateTime<Utc>, id: OrderId) -> String {
    format!("ORD-{}-{:04}", created_at.format("%Y%m%d"), id)
}
