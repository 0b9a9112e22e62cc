use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redis::aio::ConnectionManager;

use relay_engine::payment::PaymentReminderService;

use super::run_leased;
use super::scheduler::{Job, JobFrequency};

const LEASE_TTL: Duration = Duration::from_secs(60 * 60);

/// Daily payment reminders at a fixed local hour.
pub struct PaymentReminderJob {
    service: Arc<PaymentReminderService>,
    redis: ConnectionManager,
    hour: u32,
    utc_offset_hours: i32,
}

impl PaymentReminderJob {
    pub fn new(
        service: Arc<PaymentReminderService>,
        redis: ConnectionManager,
        hour: u32,
        utc_offset_hours: i32,
    ) -> Self {
        Self {
            service,
            redis,
            hour,
            utc_offset_hours,
        }
    }
}

#[async_trait::async_trait]
impl Job for PaymentReminderJob {
    fn name(&self) -> &'static str {
        "payment_reminder"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::DailyAt {
            hour: self.hour,
            minute: 0,
            utc_offset_hours: self.utc_offset_hours,
        }
    }

    async fn execute(&self) -> Result<(), String> {
        run_leased(&self.redis, self.name(), LEASE_TTL, self.service.run(Utc::now())).await?;
        Ok(())
    }
}
