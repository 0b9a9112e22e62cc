//! Collection reminder delivery.
//!
//! Each run:
//! 1. Releases claims abandoned by crashed workers
//! 2. Selects due `pending` reminders, oldest first, bounded by the batch size
//! 3. Claims each one (`pending → processing`) before touching it
//! 4. Re-checks the live order against the eligibility rules
//! 5. Sends through WhatsApp and email independently and logs the attempt
//! 6. Moves the reminder to `sent`, back to `pending` with a later due time, or `failed`
//!
//! Every write after the claim is conditioned on the claim token, so a worker that
//! lost its claim cannot overwrite somebody else's result.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use relay_common::config::AppConfig;
use relay_common::error::AppError;
use relay_common::types::{DeliveryChannel, NotificationType, ReminderRecord};
use relay_notifier::{Channels, DispatchReport, Envelope};

use crate::eligibility::{self, CancelReason, EligibilityRule};
use crate::notification_log::{NewLogEntry, NotificationLogService};
use crate::orders::OrderRepository;
use crate::render;
use crate::retry::{self, RetryKind, Transition};

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub batch_size: i64,
    pub inter_item_delay: StdDuration,
    pub claim_timeout: Duration,
}

impl DeliverySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.reminder_batch_size,
            inter_item_delay: StdDuration::from_millis(config.inter_item_delay_ms),
            claim_timeout: Duration::minutes(config.claim_timeout_minutes),
        }
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            inter_item_delay: StdDuration::from_millis(500),
            claim_timeout: Duration::minutes(60),
        }
    }
}

/// State change to apply after a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderUpdate {
    MarkSent {
        channel: DeliveryChannel,
        at: DateTime<Utc>,
    },
    Reschedule {
        retry_count: i32,
        at: DateTime<Utc>,
        error: String,
    },
    MarkFailed {
        error: String,
    },
}

/// Decide the reminder's next state from the channel results.
pub fn decide(record: &ReminderRecord, report: &DispatchReport, now: DateTime<Utc>) -> ReminderUpdate {
    if let Some(channel) = report.delivered_channel() {
        return ReminderUpdate::MarkSent { channel, at: now };
    }

    let error = report
        .error_summary()
        .unwrap_or_else(|| "all channels failed".to_string());

    match retry::after_failure(RetryKind::Reminder, record.retry_count, now) {
        Transition::Reschedule { retry_count, at } => ReminderUpdate::Reschedule {
            retry_count,
            at,
            error,
        },
        Transition::Exhausted { .. } => ReminderUpdate::MarkFailed { error },
    }
}

/// What happened to one selected reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Another worker claimed it, or it changed since selection.
    Skipped,
    Cancelled(CancelReason),
    Sent(DeliveryChannel),
    Rescheduled { retry_count: i32 },
    Failed,
    /// The attempt was made but the claim was gone when writing the result.
    ClaimLost,
}

impl ItemOutcome {
    fn dispatched(&self) -> bool {
        matches!(
            self,
            ItemOutcome::Sent(_)
                | ItemOutcome::Rescheduled { .. }
                | ItemOutcome::Failed
                | ItemOutcome::ClaimLost
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub released: u64,
    pub selected: u32,
    pub skipped: u32,
    pub sent: u32,
    pub cancelled: u32,
    pub rescheduled: u32,
    pub failed: u32,
    pub claim_lost: u32,
    pub errors: u32,
}

impl RunSummary {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Cancelled(_) => self.cancelled += 1,
            ItemOutcome::Sent(_) => self.sent += 1,
            ItemOutcome::Rescheduled { .. } => self.rescheduled += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::ClaimLost => self.claim_lost += 1,
        }
    }
}

pub struct DeliveryProcessor {
    pool: PgPool,
    channels: Channels,
    rules: Vec<EligibilityRule>,
    settings: DeliverySettings,
}

impl DeliveryProcessor {
    pub fn new(pool: PgPool, channels: Channels, settings: DeliverySettings) -> Self {
        Self {
            pool,
            channels,
            rules: eligibility::default_rules(),
            settings,
        }
    }

    /// Replace the eligibility rules.
    pub fn with_rules(mut self, rules: Vec<EligibilityRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Process one batch of due reminders as of `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, AppError> {
        let mut summary = RunSummary {
            released: self.release_stale_claims(now).await?,
            ..Default::default()
        };

        let due = self.select_due(now).await?;
        summary.selected = due.len() as u32;

        for (index, record) in due.iter().enumerate() {
            match self.process_one(record, now).await {
                Ok(outcome) => {
                    summary.record(&outcome);
                    let more = index + 1 < due.len();
                    if outcome.dispatched() && more && !self.settings.inter_item_delay.is_zero() {
                        tokio::time::sleep(self.settings.inter_item_delay).await;
                    }
                }
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(
                        reminder_id = %record.id,
                        order_id = %record.order_id,
                        error = %e,
                        "Reminder processing failed"
                    );
                }
            }
        }

        if summary.selected > 0 || summary.released > 0 {
            tracing::info!(
                selected = summary.selected,
                sent = summary.sent,
                cancelled = summary.cancelled,
                rescheduled = summary.rescheduled,
                failed = summary.failed,
                skipped = summary.skipped,
                claim_lost = summary.claim_lost,
                errors = summary.errors,
                released = summary.released,
                "Reminder delivery run finished"
            );
        }

        Ok(summary)
    }

    async fn select_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRecord>, AppError> {
        let records: Vec<ReminderRecord> = sqlx::query_as(
            r#"
            SELECT * FROM reminder_records
            WHERE status = 'pending' AND scheduled_date <= $1
            ORDER BY scheduled_date ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(self.settings.batch_size)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Return claims older than the claim timeout to `pending`.
    pub async fn release_stale_claims(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let cutoff = now - self.settings.claim_timeout;
        let result = sqlx::query(
            r#"
            UPDATE reminder_records
            SET status = 'pending', claim_token = NULL, claimed_at = NULL, updated_at = NOW()
            WHERE status = 'processing' AND claimed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected();
        if released > 0 {
            tracing::warn!(released, "Released stale reminder claims");
        }
        Ok(released)
    }

    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<(ReminderRecord, Uuid)>, AppError> {
        let token = Uuid::new_v4();
        let claimed: Option<ReminderRecord> = sqlx::query_as(
            r#"
            UPDATE reminder_records
            SET status = 'processing', claim_token = $2, claimed_at = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND scheduled_date <= $3
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed.map(|r| (r, token)))
    }

    async fn process_one(
        &self,
        record: &ReminderRecord,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, AppError> {
        let Some((claimed, token)) = self.claim(record.id, now).await? else {
            tracing::debug!(reminder_id = %record.id, "Reminder already claimed, skipping");
            return Ok(ItemOutcome::Skipped);
        };

        match self.deliver_claimed(&claimed, token, now).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(release_err) = self.release_with_error(claimed.id, token, &e).await {
                    tracing::error!(
                        reminder_id = %claimed.id,
                        error = %release_err,
                        "Failed to release claim after processing error"
                    );
                }
                Err(e)
            }
        }
    }

    async fn deliver_claimed(
        &self,
        record: &ReminderRecord,
        token: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, AppError> {
        let order = OrderRepository::find(&self.pool, &record.order_id).await?;

        if let Err((rule, reason)) = eligibility::evaluate(&self.rules, order.as_ref()) {
            let applied = self.cancel(record.id, token, &reason).await?;
            tracing::info!(
                reminder_id = %record.id,
                order_id = %record.order_id,
                rule,
                reason = %reason,
                "Reminder cancelled"
            );
            return Ok(if applied {
                ItemOutcome::Cancelled(reason)
            } else {
                ItemOutcome::ClaimLost
            });
        }

        let customer = OrderRepository::find_customer(&self.pool, &record.customer_id).await?;
        let phone = record
            .customer_phone
            .clone()
            .or_else(|| customer.as_ref().and_then(|c| c.phone.clone()));
        let email = customer.as_ref().and_then(|c| c.email.clone());

        let days = render::days_uncollected(order.as_ref().and_then(|o| o.completion_time()), now);
        let message = render::render_collection_reminder(record, days);

        let report = self
            .channels
            .dispatch(&Envelope {
                phone: phone.as_deref(),
                template_name: message.template_name,
                parameters: &message.parameters,
                email: email.as_deref(),
                subject: &message.subject,
                html: &message.html,
            })
            .await;

        let entry = NewLogEntry {
            notification_type: NotificationType::CollectionReminder,
            customer_id: Some(record.customer_id.clone()),
            recipient_phone: phone.clone(),
            recipient_email: email.clone(),
            order_id: Some(record.order_id.clone()),
            reminder_id: Some(record.id),
        }
        .with_report(&report, now);

        if let Err(e) = NotificationLogService::append(&self.pool, &entry).await {
            tracing::error!(
                reminder_id = %record.id,
                error = %e,
                "Failed to write notification log entry"
            );
        }

        let update = decide(record, &report, now);
        let applied = self.apply(record.id, token, &update).await?;
        if !applied {
            tracing::warn!(reminder_id = %record.id, "Claim lost before result was written");
            return Ok(ItemOutcome::ClaimLost);
        }

        let outcome = match update {
            ReminderUpdate::MarkSent { channel, .. } => {
                tracing::info!(
                    reminder_id = %record.id,
                    order_id = %record.order_id,
                    channel = %channel,
                    days_uncollected = days,
                    "Reminder sent"
                );
                ItemOutcome::Sent(channel)
            }
            ReminderUpdate::Reschedule {
                retry_count, at, ..
            } => {
                tracing::warn!(
                    reminder_id = %record.id,
                    retry_count,
                    next_attempt = %at,
                    "Reminder delivery failed, rescheduled"
                );
                ItemOutcome::Rescheduled { retry_count }
            }
            ReminderUpdate::MarkFailed { ref error } => {
                tracing::error!(
                    reminder_id = %record.id,
                    order_id = %record.order_id,
                    error = %error,
                    "Reminder permanently failed after retries"
                );
                ItemOutcome::Failed
            }
        };

        Ok(outcome)
    }

    async fn cancel(&self, id: Uuid, token: Uuid, reason: &CancelReason) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE reminder_records
            SET status = 'cancelled', cancel_reason = $3, error_message = $4,
                claim_token = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND claim_token = $2
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(reason.code())
        .bind(reason.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply(&self, id: Uuid, token: Uuid, update: &ReminderUpdate) -> Result<bool, AppError> {
        let result = match update {
            ReminderUpdate::MarkSent { channel, at } => {
                sqlx::query(
                    r#"
                    UPDATE reminder_records
                    SET status = 'sent', channel = $3, sent_date = $4, error_message = NULL,
                        claim_token = NULL, updated_at = NOW()
                    WHERE id = $1 AND status = 'processing' AND claim_token = $2
                    "#,
                )
                .bind(id)
                .bind(token)
                .bind(channel.to_string())
                .bind(at)
                .execute(&self.pool)
                .await?
            }
            ReminderUpdate::Reschedule {
                retry_count,
                at,
                error,
            } => {
                sqlx::query(
                    r#"
                    UPDATE reminder_records
                    SET status = 'pending', retry_count = $3, scheduled_date = $4,
                        error_message = $5, claim_token = NULL, claimed_at = NULL,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'processing' AND claim_token = $2
                    "#,
                )
                .bind(id)
                .bind(token)
                .bind(retry_count)
                .bind(at)
                .bind(error)
                .execute(&self.pool)
                .await?
            }
            ReminderUpdate::MarkFailed { error } => {
                sqlx::query(
                    r#"
                    UPDATE reminder_records
                    SET status = 'failed', error_message = $3, claim_token = NULL,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'processing' AND claim_token = $2
                    "#,
                )
                .bind(id)
                .bind(token)
                .bind(error)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    /// Hand a claimed reminder back to `pending`, keeping its due time, with the error recorded.
    async fn release_with_error(&self, id: Uuid, token: Uuid, error: &AppError) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE reminder_records
            SET status = 'pending', error_message = $3, claim_token = NULL, claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND claim_token = $2
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(error.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
