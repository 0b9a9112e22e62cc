use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redis::aio::ConnectionManager;

use relay_engine::generic_retry::GenericRetryTrigger;

use super::run_leased;
use super::scheduler::{Job, JobFrequency};

/// Headroom for the claim, sweep and write-back queries of one poll.
const LEASE_MARGIN: Duration = Duration::from_secs(60);

/// Longest a poll can take: one bounded send per due row, plus the margin.
pub fn lease_ttl(batch_size: i64, channel_timeout: Duration) -> Duration {
    let sends = u32::try_from(batch_size.max(1)).unwrap_or(u32::MAX);
    channel_timeout.saturating_mul(sends).saturating_add(LEASE_MARGIN)
}

/// Minute poll that delivers due generic retries and catches missed triggers.
pub struct GenericRetryJob {
    trigger: Arc<GenericRetryTrigger>,
    redis: ConnectionManager,
    lease_ttl: Duration,
}

impl GenericRetryJob {
    pub fn new(
        trigger: Arc<GenericRetryTrigger>,
        redis: ConnectionManager,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            trigger,
            redis,
            lease_ttl,
        }
    }
}

#[async_trait::async_trait]
impl Job for GenericRetryJob {
    fn name(&self) -> &'static str {
        "generic_retry"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(1)
    }

    async fn execute(&self) -> Result<(), String> {
        run_leased(&self.redis, self.name(), self.lease_ttl, self.trigger.run(Utc::now())).await?;
        Ok(())
    }
}
