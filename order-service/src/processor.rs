use async_trait::async_trait;
use message_queue::{consume_next, FailurePolicy, MessageQueue, Outcome, PollingWorker, QueueError, QueueMessage};
use shared::{queues, Payload};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::workflow::OrderWorkflow;

/// Background consumer of the `order-processing` queue.
pub struct OrderProcessor {
    workflow: Arc<OrderWorkflow>,
    queue: MessageQueue,
    receive_timeout: Duration,
    policy: FailurePolicy,
}

impl OrderProcessor {
    pub fn new(
        workflow: Arc<OrderWorkflow>,
        queue: MessageQueue,
        receive_timeout: Duration,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            workflow,
            queue,
            receive_timeout,
            policy,
        }
    }

    pub async fn process_next(&self) -> Result<Outcome, QueueError> {
        let workflow = Arc::clone(&self.workflow);
        consume_next(
            &self.queue,
            queues::ORDER_PROCESSING,
            self.receive_timeout,
            self.policy,
            |message| handle_message(workflow, message),
        )
        .await
    }
}

async fn handle_message(workflow: Arc<OrderWorkflow>, message: QueueMessage) -> anyhow::Result<()> {
    let order_message = match message.payload {
        Payload::OrderProcessing(order_message) => order_message,
        other => anyhow::bail!(
            "{} payload does not belong on {}",
            other.kind(),
            queues::ORDER_PROCESSING
        ),
    };

    // A domain rejection will not change on redelivery, so the message is settled anyway.
    if let Err(e) = workflow.advance_from_queue(&order_message).await {
        warn!("Failed to process order {}: {}", order_message.order_id, e);
    }
    Ok(())
}

#[async_trait]
impl PollingWorker for OrderProcessor {
    fn name(&self) -> &str {
        "Order Processing Service"
    }

    async fn poll_once(&self) -> anyhow::Result<()> {
        self.process_next().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateOrderRequest, OrderItemRequest};
    use crate::store::OrderStore;
    use bigdecimal::BigDecimal;
    use inventory_service::{InventoryLedger, Product};
    use shared::{OrderStatus, SmsNotification};

    const WAIT: Duration = Duration::from_millis(20);

    fn setup() -> (Arc<OrderWorkflow>, MessageQueue) {
        let queue = MessageQueue::new();
        let ledger = InventoryLedger::with_products([Product::new(1, "Mug", BigDecimal::from(8), 3)]);
        let workflow = OrderWorkflow::new(Arc::new(ledger), Arc::new(OrderStore::new()), queue.clone());
        (Arc::new(workflow), queue)
    }

    fn one_mug() -> CreateOrderRequest {
        CreateOrderRequest {
            items: vec![OrderItemRequest {
                product_id: 1,
                quantity: 1,
            }],
            shipping_address: "2 High St".to_string(),
            payment_method: "cash".to_string(),
        }
    }

    #[tokio::test]
    async fn completes_queued_orders() {
        let (workflow, queue) = setup();
        let processor = OrderProcessor::new(workflow.clone(), queue.clone(), WAIT, FailurePolicy::Drop);
        let order = workflow.create_order(3, one_mug()).unwrap();

        assert_eq!(processor.process_next().await.unwrap(), Outcome::Acknowledged);
        assert_eq!(workflow.get_order(order.id).unwrap().status, OrderStatus::Completed);
        assert_eq!(queue.len(queues::PUSH_NOTIFICATIONS), 1);
        assert_eq!(processor.process_next().await.unwrap(), Outcome::Idle);
    }

    #[tokio::test]
    async fn domain_rejection_is_acknowledged() {
        let (workflow, queue) = setup();
        let processor = OrderProcessor::new(
            workflow.clone(),
            queue.clone(),
            WAIT,
            FailurePolicy::Retry { max_attempts: 5 },
        );
        let order = workflow.create_order(3, one_mug()).unwrap();
        workflow.cancel_order(order.id).unwrap();

        assert_eq!(processor.process_next().await.unwrap(), Outcome::Acknowledged);
        assert!(queue.is_empty(queues::ORDER_PROCESSING));
        assert_eq!(workflow.get_order(order.id).unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn foreign_payload_goes_through_failure_policy() {
        let (workflow, queue) = setup();
        let processor = OrderProcessor::new(
            workflow,
            queue.clone(),
            WAIT,
            FailurePolicy::Retry { max_attempts: 1 },
        );
        queue
            .publish(
                queues::ORDER_PROCESSING,
                SmsNotification {
                    phone_number: "+15550100".to_string(),
                    message: "wrong queue".to_string(),
                },
            )
            .unwrap();

        assert_eq!(processor.process_next().await.unwrap(), Outcome::DeadLettered);
        assert_eq!(queue.len(&queues::dead_letter(queues::ORDER_PROCESSING)), 1);
    }
}
