use async_trait::async_trait;
use shared::{EmailNotification, PushNotification, SmsNotification};
use std::time::Duration;
use tracing::info;

/// Outbound notification channels. Delivery guarantees are the channel's own business.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_email(&self, notification: &EmailNotification) -> anyhow::Result<()>;

    async fn send_sms(&self, notification: &SmsNotification) -> anyhow::Result<()>;

    async fn send_push(&self, notification: &PushNotification) -> anyhow::Result<()>;
}

/// Stand-in sender that only logs, after an optional artificial delay.
#[derive(Debug, Clone, Default)]
pub struct LoggingSender {
    delay: Duration,
}

impl LoggingSender {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    async fn simulate(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl NotificationSender for LoggingSender {
    async fn send_email(&self, notification: &EmailNotification) -> anyhow::Result<()> {
        info!("Sending email to: {}, Subject: {}", notification.to, notification.subject);
        self.simulate().await;
        info!("Email sent successfully to: {}", notification.to);
        Ok(())
    }

    async fn send_sms(&self, notification: &SmsNotification) -> anyhow::Result<()> {
        info!("Sending SMS to: {}", notification.phone_number);
        self.simulate().await;
        info!("SMS sent successfully to: {}", notification.phone_number);
        Ok(())
    }

    async fn send_push(&self, notification: &PushNotification) -> anyhow::Result<()> {
        info!("Sending push notification to user: {}", notification.user_id);
        self.simulate().await;
        info!("Push notification sent successfully to user: {}", notification.user_id);
        Ok(())
    }
}
