use async_trait::async_trait;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DEFAULT_ERROR_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Pause after a successful iteration.
    pub interval: Duration,
    /// Pause after a failed iteration.
    pub error_cooldown: Duration,
}

impl PollSchedule {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            error_cooldown: DEFAULT_ERROR_COOLDOWN,
        }
    }

    pub fn with_error_cooldown(mut self, error_cooldown: Duration) -> Self {
        self.error_cooldown = error_cooldown;
        self
    }
}

/// A background job that does one unit of queue work per call.
#[async_trait]
pub trait PollingWorker: Send + Sync {
    fn name(&self) -> &str;

    async fn poll_once(&self) -> anyhow::Result<()>;
}

/// Drives `worker` until `shutdown` fires.
///
/// Cancellation is only observed between iterations, so a message received in
/// an iteration is always settled before the loop exits.
pub async fn run_worker<W>(worker: &W, schedule: PollSchedule, shutdown: CancellationToken)
where
    W: PollingWorker + ?Sized,
{
    info!("{} started", worker.name());

    while !shutdown.is_cancelled() {
        let pause = match worker.poll_once().await {
            Ok(()) => schedule.interval,
            Err(e) => {
                error!("Error occurred in {}: {:#}", worker.name(), e);
                schedule.error_cooldown
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = time::sleep(pause) => {}
        }
    }

    info!("{} stopped", worker.name());
}
