use anyhow::Result;
use clap::Parser;
use inventory_service::InventoryLedger;
use message_queue::{run_worker, MessageQueue};
use notification_service::{LoggingSender, NotificationDispatcher};
use order_service::api::{self, AppState};
use order_service::{Config, OrderProcessor, OrderStore, OrderWorkflow};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let config = Config::parse();

    let ledger = match &config.catalog {
        Some(path) => InventoryLedger::from_catalog_file(path)?,
        None => InventoryLedger::new(),
    };
    let queue = MessageQueue::new();
    let workflow = Arc::new(
        OrderWorkflow::new(Arc::new(ledger), Arc::new(OrderStore::new()), queue.clone())
            .with_processing_delay(config.processing_delay()),
    );

    let shutdown = CancellationToken::new();

    let order_processor = OrderProcessor::new(
        workflow.clone(),
        queue.clone(),
        config.receive_timeout(),
        config.failure_policy(),
    );
    let order_schedule = config.order_schedule();
    let token = shutdown.clone();
    let order_task = tokio::spawn(async move {
        run_worker(&order_processor, order_schedule, token).await;
    });

    let dispatcher = NotificationDispatcher::new(
        queue.clone(),
        Arc::new(LoggingSender::new(Duration::from_millis(100))),
        config.receive_timeout(),
        config.failure_policy(),
    );
    let notification_schedule = config.notification_schedule();
    let token = shutdown.clone();
    let notification_task = tokio::spawn(async move {
        run_worker(&dispatcher, notification_schedule, token).await;
    });

    let app = api::create_router(AppState { workflow });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    info!("Order service web server started on port {}", config.port);
    info!("Order service ready to accept HTTP requests at http://0.0.0.0:{}/api/orders", config.port);

    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
            token.cancel();
        })
        .await?;

    shutdown.cancel();
    order_task.await?;
    notification_task.await?;
    queue.close();

    info!("Order service stopped");
    Ok(())
}
