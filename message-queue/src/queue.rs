use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use shared::Payload;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::QueueError;

type Handler = Arc<dyn Fn(&QueueMessage) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueMessage {
    pub id: Uuid,
    pub payload: Payload,
    pub enqueued_at: DateTime<Utc>,
    pub delivery_count: u32,
}

impl QueueMessage {
    fn new(payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            enqueued_at: Utc::now(),
            delivery_count: 0,
        }
    }
}

/// How a named queue hands out its messages. A queue uses exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Consumers call `receive` and settle each message with `acknowledge` or `reject`.
    Pull,
    /// Every publish is handed to one registered subscriber, round-robin.
    Push,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Pull => f.write_str("pull"),
            DeliveryMode::Push => f.write_str("push"),
        }
    }
}

struct QueueState {
    mode: DeliveryMode,
    ready: VecDeque<QueueMessage>,
    in_flight: HashMap<Uuid, QueueMessage>,
    subscribers: Vec<Handler>,
    next_subscriber: usize,
}

impl QueueState {
    fn new() -> Self {
        Self {
            mode: DeliveryMode::Pull,
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            subscribers: Vec::new(),
            next_subscriber: 0,
        }
    }

    fn next_handler(&mut self) -> Option<Handler> {
        if self.subscribers.is_empty() {
            return None;
        }
        let handler = Arc::clone(&self.subscribers[self.next_subscriber % self.subscribers.len()]);
        self.next_subscriber = self.next_subscriber.wrapping_add(1);
        Some(handler)
    }
}

struct NamedQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

#[derive(Default)]
struct Inner {
    queues: RwLock<HashMap<String, Arc<NamedQueue>>>,
    closed: AtomicBool,
}

/// Named, in-memory, at-least-once queues.
///
/// Cloning is cheap and every clone sees the same queues. Each named queue has
/// its own lock, so traffic on different names never contends.
#[derive(Clone, Default)]
pub struct MessageQueue {
    inner: Arc<Inner>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message to the tail of `queue` and returns its id.
    ///
    /// On a push queue the message goes straight to one subscriber on the
    /// caller's task; a failing subscriber is logged and the message dropped.
    pub fn publish(&self, queue: &str, payload: impl Into<Payload>) -> Result<Uuid, QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }

        let named = self.named(queue);
        let mut message = QueueMessage::new(payload.into());
        let id = message.id;

        let handler = {
            let mut state = named.state.lock();
            match state.mode {
                DeliveryMode::Pull => {
                    state.ready.push_back(message.clone());
                    None
                }
                DeliveryMode::Push => state.next_handler(),
            }
        };

        match handler {
            None => {
                debug!("Published {} message {} to {}", message.payload.kind(), id, queue);
                named.available.notify_waiters();
            }
            Some(handler) => {
                message.delivery_count = 1;
                if let Err(e) = handler(&message) {
                    warn!("Subscriber on {} failed for message {}: {:#}", queue, id, e);
                }
            }
        }

        Ok(id)
    }

    /// Registers a push subscriber. Only an empty pull queue can be turned into a push queue.
    pub fn subscribe<F>(&self, queue: &str, handler: F) -> Result<(), QueueError>
    where
        F: Fn(&QueueMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let named = self.named(queue);
        let mut state = named.state.lock();

        if state.mode == DeliveryMode::Pull {
            if !state.ready.is_empty() || !state.in_flight.is_empty() {
                return Err(QueueError::DeliveryMode {
                    queue: queue.to_string(),
                    mode: DeliveryMode::Pull,
                });
            }
            state.mode = DeliveryMode::Push;
        }

        state.subscribers.push(Arc::new(handler));
        debug!("Subscriber {} registered on {}", state.subscribers.len(), queue);
        Ok(())
    }

    /// Takes the oldest message of `queue`, waiting up to `timeout` for one to arrive.
    ///
    /// The message stays in flight until it is acknowledged or rejected.
    /// `Ok(None)` means the wait timed out.
    pub async fn receive(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<QueueMessage>, QueueError> {
        let named = self.named(queue);
        // A timeout too large to represent waits without a deadline.
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let notified = named.available.notified();
            tokio::pin!(notified);
            // Register interest before looking so a publish in between is not missed.
            notified.as_mut().enable();

            if let Some(message) = take_next(&named, queue)? {
                return Ok(Some(message));
            }

            match deadline {
                Some(deadline) => {
                    if time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    pub fn acknowledge(&self, queue: &str, message_id: Uuid) -> Result<(), QueueError> {
        self.settle(queue, message_id)?;
        debug!("Acknowledged message {} on {}", message_id, queue);
        Ok(())
    }

    /// Gives a message back: to the tail of the queue when `requeue`, otherwise for good.
    pub fn reject(&self, queue: &str, message_id: Uuid, requeue: bool) -> Result<(), QueueError> {
        let message = self.settle(queue, message_id)?;

        if requeue {
            if let Some(named) = self.existing(queue) {
                named.state.lock().ready.push_back(message);
                named.available.notify_waiters();
            }
            debug!("Requeued message {} on {}", message_id, queue);
        } else {
            debug!("Discarded message {} on {}", message_id, queue);
        }
        Ok(())
    }

    /// Number of messages waiting to be received.
    pub fn len(&self, queue: &str) -> usize {
        self.existing(queue)
            .map(|named| named.state.lock().ready.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Number of received messages not yet acknowledged or rejected.
    pub fn in_flight(&self, queue: &str) -> usize {
        self.existing(queue)
            .map(|named| named.state.lock().in_flight.len())
            .unwrap_or_default()
    }

    pub fn mode(&self, queue: &str) -> Option<DeliveryMode> {
        self.existing(queue).map(|named| named.state.lock().mode)
    }

    /// Refuses further publishes. Messages already queued stay receivable.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn settle(&self, queue: &str, message_id: Uuid) -> Result<QueueMessage, QueueError> {
        self.existing(queue)
            .and_then(|named| named.state.lock().in_flight.remove(&message_id))
            .ok_or_else(|| QueueError::MessageNotFound {
                queue: queue.to_string(),
                message_id,
            })
    }

    fn existing(&self, queue: &str) -> Option<Arc<NamedQueue>> {
        self.inner.queues.read().get(queue).cloned()
    }

    fn named(&self, queue: &str) -> Arc<NamedQueue> {
        if let Some(named) = self.existing(queue) {
            return named;
        }
        let mut queues = self.inner.queues.write();
        Arc::clone(queues.entry(queue.to_string()).or_insert_with(|| {
            Arc::new(NamedQueue {
                state: Mutex::new(QueueState::new()),
                available: Notify::new(),
            })
        }))
    }
}

fn take_next(named: &NamedQueue, queue: &str) -> Result<Option<QueueMessage>, QueueError> {
    let mut state = named.state.lock();
    if state.mode == DeliveryMode::Push {
        return Err(QueueError::DeliveryMode {
            queue: queue.to_string(),
            mode: DeliveryMode::Push,
        });
    }

    let Some(mut message) = state.ready.pop_front() else {
        return Ok(None);
    };
    message.delivery_count += 1;
    state.in_flight.insert(message.id, message.clone());
    Ok(Some(message))
}
