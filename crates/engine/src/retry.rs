//! Retry policy shared by collection reminders and generic notifications.
//!
//! Both families walk the same state machine:
//!
//! ```text
//! pending ─claim─▶ processing ─┬─▶ sent
//!                              ├─▶ cancelled                (reminders only)
//!                              ├─▶ retry scheduled ─▶ pending / pending_retry
//!                              └─▶ failed / permanently_failed
//! ```
//!
//! Only how long a retry waits differs, and that lives in [`delay`].

use chrono::{DateTime, Duration, Utc};

/// Attempts after which a failed delivery becomes terminal.
pub const MAX_RETRY_ATTEMPTS: i32 = 3;

/// Fixed wait between collection reminder attempts.
pub const REMINDER_RETRY_HOURS: i64 = 4;

/// First wait for a generic notification; doubles with each attempt.
pub const GENERIC_BASE_DELAY_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    /// Collection reminders, re-polled by the hourly batch.
    Reminder,
    /// Generic notifications, exponential backoff.
    Generic,
}

/// Wait before retrying after `attempt` previous retries.
pub fn delay(kind: RetryKind, attempt: i32) -> Duration {
    match kind {
        RetryKind::Reminder => Duration::hours(REMINDER_RETRY_HOURS),
        RetryKind::Generic => {
            let exponent = attempt.clamp(0, 30) as u32;
            Duration::seconds(GENERIC_BASE_DELAY_SECS * 2i64.pow(exponent))
        }
    }
}

/// Next state after a delivery attempt in which no channel succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Try again at `at`, with the incremented counter.
    Reschedule { retry_count: i32, at: DateTime<Utc> },
    /// Cap reached; the record becomes terminal and keeps its counter.
    Exhausted { retry_count: i32 },
}

impl Transition {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Transition::Exhausted { .. })
    }
}

/// Decide what happens to a record that has already been retried `retry_count` times
/// and just failed again.
pub fn after_failure(kind: RetryKind, retry_count: i32, now: DateTime<Utc>) -> Transition {
    if retry_count >= MAX_RETRY_ATTEMPTS {
        return Transition::Exhausted {
            retry_count: retry_count.min(MAX_RETRY_ATTEMPTS),
        };
    }

    Transition::Reschedule {
        retry_count: retry_count + 1,
        at: now + delay(kind, retry_count),
    }
}
