use inventory_service::InventoryLedger;
use message_queue::MessageQueue;
use shared::{
    queues, OrderAction, OrderId, OrderProcessingMessage, OrderStatus, ProductId, PushNotification,
    ShopError, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{CreateOrderRequest, NewOrder, Order, OrderItem};
use crate::store::OrderStore;

/// Coordinates the ledger, the order store and the queue for every order operation.
pub struct OrderWorkflow {
    ledger: Arc<InventoryLedger>,
    store: Arc<OrderStore>,
    queue: MessageQueue,
    processing_delay: Duration,
}

impl OrderWorkflow {
    pub fn new(ledger: Arc<InventoryLedger>, store: Arc<OrderStore>, queue: MessageQueue) -> Self {
        Self {
            ledger,
            store,
            queue,
            processing_delay: Duration::ZERO,
        }
    }

    /// Simulated work between `Processing` and `Completed` when a process message is handled.
    pub fn with_processing_delay(mut self, processing_delay: Duration) -> Self {
        self.processing_delay = processing_delay;
        self
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Reserves stock for every line at once, stores the order as `Pending` and
    /// queues it for processing.
    pub fn create_order(
        &self,
        user_id: UserId,
        request: CreateOrderRequest,
    ) -> Result<Order, ShopError> {
        if request.items.is_empty() {
            return Err(ShopError::InvalidArgument(
                "order must contain at least one item".to_string(),
            ));
        }

        let mut lines: Vec<(ProductId, u32)> = Vec::with_capacity(request.items.len());
        for item in &request.items {
            if item.quantity == 0 {
                return Err(ShopError::InvalidArgument(format!(
                    "quantity for product {} must be at least 1",
                    item.product_id
                )));
            }
            // Unknown products fail here, before any stock moves.
            self.ledger.get_product(item.product_id)?;
            lines.push((item.product_id, item.quantity));
        }

        let items: Vec<OrderItem> = self
            .ledger
            .reserve_batch(&lines)?
            .into_iter()
            .map(|reservation| OrderItem {
                product_id: reservation.product_id,
                quantity: reservation.quantity,
                unit_price: reservation.unit_price,
            })
            .collect();

        let order = self.store.insert(NewOrder::new(
            user_id,
            items,
            request.shipping_address,
            request.payment_method,
        ));
        info!(
            "Created order {} for user {} totalling {}",
            order.order_number, user_id, order.total_amount
        );

        if let Err(e) = self.queue.publish(
            queues::ORDER_PROCESSING,
            OrderProcessingMessage::process(order.id),
        ) {
            warn!("Failed to queue order {} for processing: {}", order.id, e);
        }

        Ok(order)
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<Order, ShopError> {
        self.store
            .get_by_id(order_id)
            .ok_or_else(|| ShopError::order_not_found(order_id))
    }

    pub fn list_orders_for_user(&self, user_id: UserId) -> Vec<Order> {
        self.store.list_by_user(user_id)
    }

    /// One page (1-based) of all orders in creation order, with the total count.
    pub fn list_all_orders(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<Order>, usize), ShopError> {
        if page == 0 || page_size == 0 {
            return Err(ShopError::InvalidArgument(format!(
                "page and page size must be at least 1, got {} and {}",
                page, page_size
            )));
        }
        let skip = (page - 1).saturating_mul(page_size);
        Ok(self.store.page(skip, page_size))
    }

    /// Moves an order along its lifecycle. A move to `Cancelled` also brings
    /// the reserved stock back; statuses outside the transition table are an
    /// `InvalidTransition`.
    pub fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, ShopError> {
        let order = self.store.update_status(order_id, status)?;
        if status == OrderStatus::Cancelled {
            self.release_stock(&order);
        }

        info!("Updated order {} status to {}", order.order_number, status);
        Ok(order)
    }

    /// Cancels a `Pending` or `Processing` order and releases its stock.
    ///
    /// Any other status is a `Conflict`, which also keeps a second cancel from
    /// releasing the same stock twice.
    pub fn cancel_order(&self, order_id: OrderId) -> Result<Order, ShopError> {
        let order = self
            .store
            .update_status_if(order_id, OrderStatus::Cancelled, |order| {
                if order.status.is_cancellable() {
                    Ok(())
                } else {
                    Err(ShopError::Conflict {
                        order_id: order.id,
                        status: order.status,
                    })
                }
            })?;

        self.release_stock(&order);
        info!("Cancelled order {}", order.order_number);
        Ok(order)
    }

    fn release_stock(&self, order: &Order) {
        for item in &order.items {
            if let Err(e) = self.ledger.release(item.product_id, item.quantity) {
                warn!(
                    "Could not restore {} of product {} for order {}: {}",
                    item.quantity, item.product_id, order.id, e
                );
            }
        }
    }

    /// Applies an order-processing message taken off the queue.
    pub async fn advance_from_queue(
        &self,
        message: &OrderProcessingMessage,
    ) -> Result<(), ShopError> {
        info!("Processing order: {}, Action: {:?}", message.order_id, message.action);

        match message.action {
            OrderAction::Process => {
                let order = self.get_order(message.order_id)?;
                if order.status == OrderStatus::Pending {
                    self.store.update_status(order.id, OrderStatus::Processing)?;
                }

                if !self.processing_delay.is_zero() {
                    tokio::time::sleep(self.processing_delay).await;
                }

                let order = self.store.update_status(order.id, OrderStatus::Completed)?;
                info!("Order {} completed", order.order_number);
                self.send_confirmation(&order);
            }
            OrderAction::Cancel => {
                self.cancel_order(message.order_id)?;
            }
            OrderAction::Unknown => {
                warn!("Unknown action for order {}, dropping message", message.order_id);
            }
        }

        Ok(())
    }

    fn send_confirmation(&self, order: &Order) {
        let notification = PushNotification {
            user_id: order.user_id,
            title: format!("Order Confirmation - Order #{}", order.order_number),
            body: format!(
                "Your order {} has been confirmed. Total Amount: ${}. Status: {}",
                order.order_number, order.total_amount, order.status
            ),
            data: HashMap::from([("order_id".to_string(), order.id.to_string())]),
        };

        if let Err(e) = self.queue.publish(queues::PUSH_NOTIFICATIONS, notification) {
            warn!("Failed to queue confirmation for order {}: {}", order.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderItemRequest;
    use bigdecimal::BigDecimal;
    use inventory_service::Product;
    use shared::Payload;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn workflow() -> OrderWorkflow {
        let ledger = InventoryLedger::with_products([
            Product::new(1, "Keyboard", dec("10.00"), 10),
            Product::new(2, "Mouse", dec("5.00"), 5),
        ]);
        OrderWorkflow::new(Arc::new(ledger), Arc::new(OrderStore::new()), MessageQueue::new())
    }

    fn request(items: &[(ProductId, u32)]) -> CreateOrderRequest {
        CreateOrderRequest {
            items: items
                .iter()
                .map(|&(product_id, quantity)| OrderItemRequest {
                    product_id,
                    quantity,
                })
                .collect(),
            shipping_address: "1 Main St".to_string(),
            payment_method: "card".to_string(),
        }
    }

    #[test]
    fn create_order_reserves_prices_and_queues() {
        let workflow = workflow();
        let order = workflow.create_order(7, request(&[(1, 2), (2, 1)])).unwrap();

        assert_eq!(order.total_amount, dec("25.00"));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.user_id, 7);
        assert_eq!(order.items[0].unit_price, dec("10.00"));
        assert_eq!(workflow.ledger().get_stock(1).unwrap(), 8);
        assert_eq!(workflow.ledger().get_stock(2).unwrap(), 4);
        assert_eq!(workflow.queue().len(queues::ORDER_PROCESSING), 1);
    }

    #[test]
    fn later_price_change_does_not_touch_order() {
        let workflow = workflow();
        let order = workflow.create_order(7, request(&[(1, 1)])).unwrap();

        workflow.ledger().set_price(1, dec("99.00")).unwrap();

        let stored = workflow.get_order(order.id).unwrap();
        assert_eq!(stored.items[0].unit_price, dec("10.00"));
        assert_eq!(stored.total_amount, dec("10.00"));
    }

    #[test]
    fn empty_and_zero_quantity_requests_are_invalid() {
        let workflow = workflow();
        assert!(matches!(
            workflow.create_order(7, request(&[])),
            Err(ShopError::InvalidArgument(_))
        ));
        assert!(matches!(
            workflow.create_order(7, request(&[(1, 0)])),
            Err(ShopError::InvalidArgument(_))
        ));
    }

    #[test]
    fn unknown_product_reserves_nothing() {
        let workflow = workflow();
        let err = workflow.create_order(7, request(&[(1, 2), (42, 1)])).unwrap_err();

        assert_eq!(err, ShopError::product_not_found(42));
        assert_eq!(workflow.ledger().get_stock(1).unwrap(), 10);
        assert!(workflow.list_all_orders(1, 20).unwrap().0.is_empty());
    }

    #[test]
    fn shortfall_aborts_whole_order() {
        let workflow = workflow();
        let err = workflow.create_order(7, request(&[(1, 5), (2, 500)])).unwrap_err();

        assert!(matches!(err, ShopError::InsufficientStock { product_id: 2, .. }));
        assert_eq!(workflow.ledger().get_stock(1).unwrap(), 10);
        assert_eq!(workflow.ledger().get_stock(2).unwrap(), 5);
        assert!(workflow.queue().is_empty(queues::ORDER_PROCESSING));
    }

    #[test]
    fn cancel_restores_stock_once() {
        let workflow = workflow();
        let order = workflow.create_order(7, request(&[(1, 2), (2, 1)])).unwrap();

        let cancelled = workflow.cancel_order(order.id).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(workflow.ledger().get_stock(1).unwrap(), 10);
        assert_eq!(workflow.ledger().get_stock(2).unwrap(), 5);

        assert_eq!(
            workflow.cancel_order(order.id),
            Err(ShopError::Conflict {
                order_id: order.id,
                status: OrderStatus::Cancelled
            })
        );
        assert_eq!(workflow.ledger().get_stock(1).unwrap(), 10);
    }

    #[test]
    fn shipped_order_cannot_be_cancelled() {
        let workflow = workflow();
        let order = workflow.create_order(7, request(&[(1, 1)])).unwrap();
        workflow.update_order_status(order.id, OrderStatus::Processing).unwrap();
        workflow.update_order_status(order.id, OrderStatus::Shipped).unwrap();

        assert!(matches!(
            workflow.cancel_order(order.id),
            Err(ShopError::Conflict { status: OrderStatus::Shipped, .. })
        ));
        assert_eq!(workflow.ledger().get_stock(1).unwrap(), 9);
    }

    #[test]
    fn cancelled_via_status_update_releases_stock() {
        let workflow = workflow();
        let order = workflow.create_order(7, request(&[(2, 3)])).unwrap();

        let order = workflow
            .update_order_status(order.id, OrderStatus::Cancelled)
            .unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(workflow.ledger().get_stock(2).unwrap(), 5);
    }

    #[test]
    fn status_update_cannot_cancel_shipped_order() {
        let workflow = workflow();
        let order = workflow.create_order(7, request(&[(1, 2)])).unwrap();
        workflow.update_order_status(order.id, OrderStatus::Processing).unwrap();
        workflow.update_order_status(order.id, OrderStatus::Shipped).unwrap();

        assert_eq!(
            workflow.update_order_status(order.id, OrderStatus::Cancelled),
            Err(ShopError::InvalidTransition {
                order_id: order.id,
                from: OrderStatus::Shipped,
                to: OrderStatus::Cancelled,
            })
        );
        assert_eq!(workflow.get_order(order.id).unwrap().status, OrderStatus::Shipped);
        assert_eq!(workflow.ledger().get_stock(1).unwrap(), 8);
    }

    #[test]
    fn status_update_to_cancelled_twice_releases_once() {
        let workflow = workflow();
        let order = workflow.create_order(7, request(&[(2, 3)])).unwrap();
        workflow.update_order_status(order.id, OrderStatus::Cancelled).unwrap();

        assert!(matches!(
            workflow.update_order_status(order.id, OrderStatus::Cancelled),
            Err(ShopError::InvalidTransition { from: OrderStatus::Cancelled, .. })
        ));
        assert_eq!(workflow.ledger().get_stock(2).unwrap(), 5);
    }

    #[test]
    fn cancel_of_missing_order_is_not_found() {
        let workflow = workflow();
        assert_eq!(workflow.cancel_order(5), Err(ShopError::order_not_found(5)));
        assert_eq!(workflow.get_order(5), Err(ShopError::order_not_found(5)));
    }

    #[test]
    fn paging_is_one_based() {
        let workflow = workflow();
        for _ in 0..3 {
            workflow.create_order(7, request(&[(1, 1)])).unwrap();
        }

        let (orders, total) = workflow.list_all_orders(2, 2).unwrap();
        assert_eq!(total, 3);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, 3);
        assert!(matches!(
            workflow.list_all_orders(0, 2),
            Err(ShopError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn process_message_completes_order_and_notifies() {
        let workflow = workflow();
        let order = workflow.create_order(7, request(&[(1, 1)])).unwrap();

        workflow
            .advance_from_queue(&OrderProcessingMessage::process(order.id))
            .await
            .unwrap();

        assert_eq!(workflow.get_order(order.id).unwrap().status, OrderStatus::Completed);
        let confirmation = workflow
            .queue()
            .receive(queues::PUSH_NOTIFICATIONS, Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        match confirmation.payload {
            Payload::Push(push) => {
                assert_eq!(push.user_id, 7);
                assert!(push.title.contains(&order.order_number));
                assert_eq!(push.data["order_id"], order.id.to_string());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancel_message_cancels_order() {
        let workflow = workflow();
        let order = workflow.create_order(7, request(&[(2, 2)])).unwrap();

        workflow
            .advance_from_queue(&OrderProcessingMessage::cancel(order.id))
            .await
            .unwrap();

        assert_eq!(workflow.get_order(order.id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(workflow.ledger().get_stock(2).unwrap(), 5);
    }

    #[tokio::test]
    async fn unknown_action_changes_nothing() {
        let workflow = workflow();
        let order = workflow.create_order(7, request(&[(1, 1)])).unwrap();

        workflow
            .advance_from_queue(&OrderProcessingMessage::new(order.id, OrderAction::Unknown))
            .await
            .unwrap();

        assert_eq!(workflow.get_order(order.id).unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn processing_a_cancelled_order_is_rejected() {
        let workflow = workflow();
        let order = workflow.create_order(7, request(&[(1, 1)])).unwrap();
        workflow.cancel_order(order.id).unwrap();

        let err = workflow
            .advance_from_queue(&OrderProcessingMessage::process(order.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidTransition { .. }));
        assert!(workflow.queue().is_empty(queues::PUSH_NOTIFICATIONS));
    }
}
