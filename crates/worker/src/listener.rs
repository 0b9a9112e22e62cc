//! Feeds row-write notifications from Postgres into the generic retry trigger.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::watch;
use uuid::Uuid;

use relay_engine::generic_retry::{GenericRetryTrigger, TriggerOutcome};

pub const CHANNEL: &str = "generic_notification_written";

pub async fn run(
    pool: PgPool,
    trigger: Arc<GenericRetryTrigger>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut listener = PgListener::connect_with(&pool).await?;
    listener.listen(CHANNEL).await?;
    tracing::info!(channel = CHANNEL, "Listening for generic notification writes");

    loop {
        tokio::select! {
            received = listener.recv() => {
                let notification = match received {
                    Ok(n) => n,
                    Err(e) => {
                        // recv reconnects on the next call; the minute poll covers the gap
                        tracing::warn!(error = %e, "Notification listener error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                let Ok(id) = Uuid::parse_str(notification.payload()) else {
                    tracing::warn!(payload = notification.payload(), "Ignoring malformed notification payload");
                    continue;
                };

                match trigger.on_write(id, Utc::now()).await {
                    Ok(TriggerOutcome::Ignored) => {}
                    Ok(outcome) => tracing::debug!(notification_id = %id, ?outcome, "Retry trigger applied"),
                    Err(e) => tracing::error!(notification_id = %id, error = %e, "Retry trigger failed"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Notification listener shutting down");
                    break;
                }
            }
        }
    }

    Ok(())
}
