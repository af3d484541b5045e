use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

mod error;

pub use error::ShopError;

pub type OrderId = u64;
pub type ProductId = u64;
pub type UserId = u64;

/// Well-known queue names shared by the workflow engine and the background workers.
pub mod queues {
    pub const ORDER_PROCESSING: &str = "order-processing";
    pub const EMAIL_NOTIFICATIONS: &str = "email-notifications";
    pub const SMS_NOTIFICATIONS: &str = "sms-notifications";
    pub const PUSH_NOTIFICATIONS: &str = "push-notifications";

    pub const NOTIFICATION_QUEUES: [&str; 3] =
        [EMAIL_NOTIFICATIONS, SMS_NOTIFICATIONS, PUSH_NOTIFICATIONS];

    pub fn dead_letter(queue: &str) -> String {
        format!("{}.dead-letter", queue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Completed,
    ];

    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[
                OrderStatus::Shipped,
                OrderStatus::Cancelled,
                OrderStatus::Completed,
            ],
            OrderStatus::Shipped => &[OrderStatus::Delivered],
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Completed => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ShopError::InvalidArgument(format!("invalid order status: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    Process,
    Cancel,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderProcessingMessage {
    pub order_id: OrderId,
    pub action: OrderAction,
    pub timestamp: DateTime<Utc>,
}

impl OrderProcessingMessage {
    pub fn new(order_id: OrderId, action: OrderAction) -> Self {
        Self {
            order_id,
            action,
            timestamp: Utc::now(),
        }
    }

    pub fn process(order_id: OrderId) -> Self {
        Self::new(order_id, OrderAction::Process)
    }

    pub fn cancel(order_id: OrderId) -> Self {
        Self::new(order_id, OrderAction::Cancel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailNotification {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsNotification {
    pub phone_number: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    pub user_id: UserId,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

/// Everything that travels through the message queue, one variant per message kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Payload {
    OrderProcessing(OrderProcessingMessage),
    Email(EmailNotification),
    Sms(SmsNotification),
    Push(PushNotification),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::OrderProcessing(_) => "order_processing",
            Payload::Email(_) => "email",
            Payload::Sms(_) => "sms",
            Payload::Push(_) => "push",
        }
    }
}

impl From<OrderProcessingMessage> for Payload {
    fn from(message: OrderProcessingMessage) -> Self {
        Payload::OrderProcessing(message)
    }
}

impl From<EmailNotification> for Payload {
    fn from(notification: EmailNotification) -> Self {
        Payload::Email(notification)
    }
}

impl From<SmsNotification> for Payload {
    fn from(notification: SmsNotification) -> Self {
        Payload::Sms(notification)
    }
}

impl From<PushNotification> for Payload {
    fn from(notification: PushNotification) -> Self {
        Payload::Push(notification)
    }
}
