//! Order lifecycle service: order storage, the workflow that ties orders to
//! inventory and the queue, the order-processing worker and its HTTP surface.

pub mod api;
pub mod config;
pub mod models;
pub mod processor;
pub mod store;
pub mod workflow;

pub use config::Config;
pub use models::{CreateOrderRequest, NewOrder, Order, OrderItem, OrderItemRequest};
pub use processor::OrderProcessor;
pub use store::OrderStore;
pub use workflow::OrderWorkflow;
