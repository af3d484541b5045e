use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use shared::{OrderId, OrderStatus, ProductId, ShopError, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price per unit at the moment the stock was reserved.
    pub unit_price: BigDecimal,
}

impl OrderItem {
    pub fn line_total(&self) -> BigDecimal {
        &self.unit_price * BigDecimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_number: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_amount: BigDecimal,
    pub shipping_address: String,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Moves the order along the lifecycle, stamping ship and delivery times the first time they are reached.
    pub fn transition_to(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), ShopError> {
        if !self.status.can_transition_to(next) {
            return Err(ShopError::InvalidTransition {
                order_id: self.id,
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        match next {
            OrderStatus::Shipped => {
                self.shipped_at.get_or_insert(now);
            }
            OrderStatus::Delivered => {
                self.delivered_at.get_or_insert(now);
            }
            _ => {}
        }
        self.updated_at = now;
        Ok(())
    }
}

/// An order before the store has given it an id and number.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_amount: BigDecimal,
    pub shipping_address: String,
    pub payment_method: String,
}

impl NewOrder {
    pub fn new(
        user_id: UserId,
        items: Vec<OrderItem>,
        shipping_address: String,
        payment_method: String,
    ) -> Self {
        let total_amount = items
            .iter()
            .fold(BigDecimal::zero(), |total, item| total + item.line_total());

        Self {
            user_id,
            items,
            total_amount,
            shipping_address,
            payment_method,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub payment_method: String,
}
