//! Stock bookkeeping for the shop: the catalog records and the ledger that
//! reserves and releases their quantities.

mod ledger;
mod models;

pub use ledger::InventoryLedger;
pub use models::{Product, Reservation};
