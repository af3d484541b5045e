use clap::{Parser, ValueEnum};
use message_queue::{FailurePolicy, PollSchedule};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicyArg {
    Drop,
    Retry,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "order-service")]
pub struct Config {
    #[arg(long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// JSON array of products to seed the inventory with.
    #[arg(long, env = "CATALOG_PATH")]
    pub catalog: Option<PathBuf>,

    #[arg(long, env = "NOTIFICATION_POLL_SECS", default_value = "10")]
    pub notification_poll_secs: u64,

    #[arg(long, env = "ORDER_POLL_SECS", default_value = "30")]
    pub order_poll_secs: u64,

    #[arg(long, env = "RECEIVE_TIMEOUT_MS", default_value = "1000")]
    pub receive_timeout_ms: u64,

    #[arg(long, env = "ERROR_COOLDOWN_SECS", default_value = "60")]
    pub error_cooldown_secs: u64,

    #[arg(long, env = "PROCESSING_DELAY_MS", default_value = "2000")]
    pub processing_delay_ms: u64,

    #[arg(long, env = "FAILURE_POLICY", value_enum, default_value = "drop")]
    pub failure_policy: FailurePolicyArg,

    #[arg(long, env = "MAX_DELIVERY_ATTEMPTS", default_value = "3")]
    pub max_delivery_attempts: u32,
}

impl Config {
    pub fn notification_schedule(&self) -> PollSchedule {
        PollSchedule::every(Duration::from_secs(self.notification_poll_secs))
            .with_error_cooldown(self.error_cooldown())
    }

    pub fn order_schedule(&self) -> PollSchedule {
        PollSchedule::every(Duration::from_secs(self.order_poll_secs))
            .with_error_cooldown(self.error_cooldown())
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        match self.failure_policy {
            FailurePolicyArg::Drop => FailurePolicy::Drop,
            FailurePolicyArg::Retry => FailurePolicy::Retry {
                max_attempts: self.max_delivery_attempts.max(1),
            },
        }
    }

    fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }
}
