use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redis::aio::ConnectionManager;

use relay_engine::delivery::DeliveryProcessor;

use super::run_leased;
use super::scheduler::{Job, JobFrequency};

const LEASE_TTL: Duration = Duration::from_secs(55 * 60);

/// Hourly delivery of due collection reminders.
pub struct ReminderDeliveryJob {
    processor: Arc<DeliveryProcessor>,
    redis: ConnectionManager,
}

impl ReminderDeliveryJob {
    pub fn new(processor: Arc<DeliveryProcessor>, redis: ConnectionManager) -> Self {
        Self { processor, redis }
    }
}

#[async_trait::async_trait]
impl Job for ReminderDeliveryJob {
    fn name(&self) -> &'static str {
        "reminder_delivery"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Hourly
    }

    async fn execute(&self) -> Result<(), String> {
        let summary = run_leased(&self.redis, self.name(), LEASE_TTL, self.processor.run(Utc::now()))
            .await?;

        if let Some(summary) = summary {
            if summary.errors > 0 {
                tracing::warn!(errors = summary.errors, "Some reminders could not be processed");
            }
        }

        Ok(())
    }
}
