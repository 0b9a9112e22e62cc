//! Scheduled jobs run by the worker.

mod generic_retry;
mod log_retention;
mod payment_reminder;
mod reminder_delivery;
mod scheduler;

use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;

use relay_common::error::AppError;
use relay_engine::lease::JobLease;

pub use generic_retry::{GenericRetryJob, lease_ttl as generic_retry_lease_ttl};
pub use log_retention::LogRetentionJob;
pub use payment_reminder::PaymentReminderJob;
pub use reminder_delivery::ReminderDeliveryJob;
pub use scheduler::JobScheduler;

/// Run `work` under the job's lease. `Ok(None)` means another run held the lease.
async fn run_leased<T, F>(
    redis: &ConnectionManager,
    job: &'static str,
    ttl: Duration,
    work: F,
) -> Result<Option<T>, String>
where
    F: Future<Output = Result<T, AppError>>,
{
    let mut conn = redis.clone();
    let lease = JobLease::try_acquire(&mut conn, job, ttl)
        .await
        .map_err(|e| format!("Failed to acquire {} lease: {}", job, e))?;

    let Some(lease) = lease else {
        return Ok(None);
    };

    let result = work.await;

    if let Err(e) = lease.release(&mut conn).await {
        tracing::warn!(job, error = %e, "Failed to release job lease");
    }

    result
        .map(Some)
        .map_err(|e| format!("{} run failed: {}", job, e))
}
