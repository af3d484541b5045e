use thiserror::Error;

use crate::{OrderId, OrderStatus, ProductId};

/// Domain failures surfaced by the ledger, the order store and the workflow engine.
///
/// Callers map these kinds onto their own protocol; nothing in here is an
/// internal fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShopError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: u32,
    },

    #[error("order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("order {order_id} cannot be cancelled in status {status}")]
    Conflict { order_id: OrderId, status: OrderStatus },
}

impl ShopError {
    pub fn product_not_found(product_id: ProductId) -> Self {
        ShopError::NotFound {
            kind: "product",
            id: product_id.to_string(),
        }
    }

    pub fn order_not_found(order_id: OrderId) -> Self {
        ShopError::NotFound {
            kind: "order",
            id: order_id.to_string(),
        }
    }

    pub fn message_not_found(queue: &str, message_id: uuid::Uuid) -> Self {
        ShopError::NotFound {
            kind: "message",
            id: format!("{}/{}", queue, message_id),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ShopError::NotFound { .. })
    }
}
