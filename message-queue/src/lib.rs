//! In-process message queue used between the order workflow and the
//! background workers, plus the helpers those workers are built from.

mod consumer;
mod error;
mod queue;
mod worker;

pub use consumer::{consume_next, FailurePolicy, Outcome};
pub use error::QueueError;
pub use queue::{DeliveryMode, MessageQueue, QueueMessage};
pub use worker::{run_worker, PollSchedule, PollingWorker};
