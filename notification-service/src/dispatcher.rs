use async_trait::async_trait;
use message_queue::{consume_next, FailurePolicy, MessageQueue, Outcome, PollingWorker, QueueMessage};
use shared::{queues, Payload};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::channels::NotificationSender;

/// Drains the email, SMS and push queues into a `NotificationSender`.
///
/// One iteration takes at most one message from each queue. A queue that
/// fails to deliver is logged and the iteration moves on to the next one.
pub struct NotificationDispatcher {
    queue: MessageQueue,
    sender: Arc<dyn NotificationSender>,
    receive_timeout: Duration,
    policy: FailurePolicy,
}

impl NotificationDispatcher {
    pub fn new(
        queue: MessageQueue,
        sender: Arc<dyn NotificationSender>,
        receive_timeout: Duration,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            queue,
            sender,
            receive_timeout,
            policy,
        }
    }

    /// One pass over every notification queue, reporting how each was settled.
    pub async fn dispatch_once(&self) -> Vec<(&'static str, Outcome)> {
        let mut outcomes = Vec::with_capacity(queues::NOTIFICATION_QUEUES.len());

        for queue_name in queues::NOTIFICATION_QUEUES {
            let sender = Arc::clone(&self.sender);
            let result = consume_next(
                &self.queue,
                queue_name,
                self.receive_timeout,
                self.policy,
                |message| deliver(sender, queue_name, message),
            )
            .await;

            match result {
                Ok(outcome) => outcomes.push((queue_name, outcome)),
                Err(e) => error!("Error processing queue {}: {}", queue_name, e),
            }
        }

        outcomes
    }
}

async fn deliver(
    sender: Arc<dyn NotificationSender>,
    queue_name: &str,
    message: QueueMessage,
) -> anyhow::Result<()> {
    debug!("Processing {} message {} from queue: {}", message.payload.kind(), message.id, queue_name);

    match (queue_name, &message.payload) {
        (queues::EMAIL_NOTIFICATIONS, Payload::Email(email)) => sender.send_email(email).await,
        (queues::SMS_NOTIFICATIONS, Payload::Sms(sms)) => sender.send_sms(sms).await,
        (queues::PUSH_NOTIFICATIONS, Payload::Push(push)) => sender.send_push(push).await,
        (_, payload) => anyhow::bail!(
            "{} payload does not belong on queue {}",
            payload.kind(),
            queue_name
        ),
    }
}

#[async_trait]
impl PollingWorker for NotificationDispatcher {
    fn name(&self) -> &str {
        "Notification Processing Service"
    }

    async fn poll_once(&self) -> anyhow::Result<()> {
        self.dispatch_once().await;
        Ok(())
    }
}
