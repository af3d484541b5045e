//! Background delivery of queued email, SMS and push notifications.

mod channels;
mod dispatcher;

pub use channels::{LoggingSender, NotificationSender};
pub use dispatcher::NotificationDispatcher;
