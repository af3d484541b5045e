use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use shared::ProductId;

/// Catalog entry owned by the ledger: the sellable unit price and quantity on hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: BigDecimal,
    pub stock: u32,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, price: BigDecimal, stock: u32) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            stock,
        }
    }
}

/// One debited line of a reservation, with the unit price read while the stock was held.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: BigDecimal,
}
