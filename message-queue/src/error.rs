use shared::ShopError;
use thiserror::Error;
use uuid::Uuid;

use crate::queue::DeliveryMode;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("message {message_id} is not in flight on queue {queue}")]
    MessageNotFound { queue: String, message_id: Uuid },

    #[error("message queue is closed")]
    Closed,

    #[error("queue {queue} uses {mode} delivery")]
    DeliveryMode { queue: String, mode: DeliveryMode },
}

impl From<QueueError> for ShopError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::MessageNotFound { queue, message_id } => {
                ShopError::message_not_found(&queue, message_id)
            }
            other => ShopError::InvalidArgument(other.to_string()),
        }
    }
}
