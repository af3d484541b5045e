use shared::queues;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::QueueError;
use crate::queue::{MessageQueue, QueueMessage};

/// What happens to a message whose handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log and discard.
    #[default]
    Drop,
    /// Requeue until the message has been delivered `max_attempts` times, then dead-letter it.
    Retry { max_attempts: u32 },
}

/// How one `consume_next` call settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Idle,
    Acknowledged,
    Requeued,
    Dropped,
    DeadLettered,
}

/// Receives at most one message from `queue_name`, runs `handler` on it and
/// settles it according to the result and `policy`.
pub async fn consume_next<F, Fut>(
    queue: &MessageQueue,
    queue_name: &str,
    timeout: Duration,
    policy: FailurePolicy,
    handler: F,
) -> Result<Outcome, QueueError>
where
    F: FnOnce(QueueMessage) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let Some(message) = queue.receive(queue_name, timeout).await? else {
        return Ok(Outcome::Idle);
    };

    let message_id = message.id;
    let attempt = message.delivery_count;
    let payload = message.payload.clone();

    let err = match handler(message).await {
        Ok(()) => {
            queue.acknowledge(queue_name, message_id)?;
            return Ok(Outcome::Acknowledged);
        }
        Err(e) => e,
    };

    error!(
        "Failed to process {} message {} from {} (attempt {}): {:#}",
        payload.kind(),
        message_id,
        queue_name,
        attempt,
        err
    );

    match policy {
        FailurePolicy::Drop => {
            queue.reject(queue_name, message_id, false)?;
            warn!("Dropped message {} from {}", message_id, queue_name);
            Ok(Outcome::Dropped)
        }
        FailurePolicy::Retry { max_attempts } if attempt < max_attempts => {
            queue.reject(queue_name, message_id, true)?;
            Ok(Outcome::Requeued)
        }
        FailurePolicy::Retry { .. } => {
            let dead_letter = queues::dead_letter(queue_name);
            if let Err(e) = queue.publish(&dead_letter, payload) {
                // Keep the message rather than lose it.
                queue.reject(queue_name, message_id, true)?;
                return Err(e);
            }
            queue.reject(queue_name, message_id, false)?;
            info!(
                "Moved message {} from {} to {} after {} attempts",
                message_id, queue_name, dead_letter, attempt
            );
            Ok(Outcome::DeadLettered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{EmailNotification, Payload};

    const WAIT: Duration = Duration::from_millis(50);

    fn email() -> EmailNotification {
        EmailNotification {
            to: "ada@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "Hi".to_string(),
            is_html: false,
        }
    }

    #[tokio::test]
    async fn idle_when_nothing_arrives() {
        let queue = MessageQueue::new();
        let outcome = consume_next(&queue, "mail", WAIT, FailurePolicy::Drop, |_| async {
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::Idle);
    }

    #[tokio::test]
    async fn success_acknowledges() {
        let queue = MessageQueue::new();
        queue.publish("mail", email()).unwrap();

        let outcome = consume_next(&queue, "mail", WAIT, FailurePolicy::Drop, |message| async move {
            assert!(matches!(message.payload, Payload::Email(_)));
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Acknowledged);
        assert_eq!(queue.in_flight("mail"), 0);
        assert!(queue.is_empty("mail"));
    }

    #[tokio::test]
    async fn drop_policy_discards_failures() {
        let queue = MessageQueue::new();
        queue.publish("mail", email()).unwrap();

        let outcome = consume_next(&queue, "mail", WAIT, FailurePolicy::Drop, |_| async {
            Err(anyhow::anyhow!("smtp down"))
        })
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Dropped);
        assert!(queue.is_empty("mail"));
        assert_eq!(queue.in_flight("mail"), 0);
    }

    #[tokio::test]
    async fn retry_policy_requeues_then_dead_letters() {
        let queue = MessageQueue::new();
        queue.publish("mail", email()).unwrap();
        let policy = FailurePolicy::Retry { max_attempts: 3 };

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            let outcome = consume_next(&queue, "mail", WAIT, policy, |_| async {
                Err(anyhow::anyhow!("smtp down"))
            })
            .await
            .unwrap();
            outcomes.push(outcome);
        }

        assert_eq!(
            outcomes,
            vec![Outcome::Requeued, Outcome::Requeued, Outcome::DeadLettered]
        );
        assert!(queue.is_empty("mail"));
        assert_eq!(queue.len("mail.dead-letter"), 1);

        let parked = queue
            .receive("mail.dead-letter", WAIT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parked.payload, Payload::Email(email()));
    }
}
