//! Redis-backed run lease for scheduled jobs.
//!
//! A job run holds `job:lease:<name>` for at most its TTL. A second invocation
//! of the same job that finds the key present skips its run. The per-record
//! claims stay the correctness guarantee; the lease only keeps overlapping runs
//! from competing for the same batch.
//!
//! Acquisition uses `SET key token NX EX ttl`; release deletes the key only
//! while it still holds our token.

use std::time::Duration;

use redis::aio::ConnectionManager;
use uuid::Uuid;

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

#[derive(Debug)]
pub struct JobLease {
    key: String,
    token: String,
}

impl JobLease {
    pub fn key_for(job: &str) -> String {
        format!("job:lease:{}", job)
    }

    /// Try to take the lease. Returns `None` while another run holds it.
    pub async fn try_acquire(
        redis: &mut ConnectionManager,
        job: &str,
        ttl: Duration,
    ) -> anyhow::Result<Option<JobLease>> {
        let key = Self::key_for(job);
        let token = Uuid::new_v4().to_string();
        let ttl_secs = ttl.as_secs().max(1);

        // Some("OK") when the key was set, None when it already exists
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(redis)
            .await?;

        if result.is_none() {
            tracing::info!(job, "Job lease held by another run, skipping");
            return Ok(None);
        }

        Ok(Some(JobLease { key, token }))
    }

    /// Release the lease if it is still ours. Returns whether a key was deleted.
    pub async fn release(self, redis: &mut ConnectionManager) -> anyhow::Result<bool> {
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(redis)
            .await?;

        if deleted == 0 {
            tracing::warn!(key = %self.key, "Job lease expired before release");
        }

        Ok(deleted == 1)
    }
}
