use std::time::Duration;

use chrono::Utc;
use redis::aio::ConnectionManager;
use sqlx::PgPool;

use relay_engine::notification_log::NotificationLogService;

use super::run_leased;
use super::scheduler::{Job, JobFrequency};

const LEASE_TTL: Duration = Duration::from_secs(10 * 60);

/// Daily sweep of notification log entries past the retention period.
pub struct LogRetentionJob {
    pool: PgPool,
    redis: ConnectionManager,
    retention_days: i64,
    utc_offset_hours: i32,
}

impl LogRetentionJob {
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        retention_days: i64,
        utc_offset_hours: i32,
    ) -> Self {
        Self {
            pool,
            redis,
            retention_days,
            utc_offset_hours,
        }
    }
}

#[async_trait::async_trait]
impl Job for LogRetentionJob {
    fn name(&self) -> &'static str {
        "log_retention"
    }

    fn frequency(&self) -> JobFrequency {
        // Local midnight
        JobFrequency::DailyAt {
            hour: 0,
            minute: 0,
            utc_offset_hours: self.utc_offset_hours,
        }
    }

    async fn execute(&self) -> Result<(), String> {
        let sweep = NotificationLogService::sweep(&self.pool, self.retention_days, Utc::now());
        run_leased(&self.redis, self.name(), LEASE_TTL, sweep).await?;
        Ok(())
    }
}
