//! Retry handling for generic notifications.
//!
//! [`GenericRetryTrigger::on_write`] reacts to every write of a notification row
//! (delivered through `LISTEN generic_notification_written`). A `failed` row is
//! either given up on or moved to `pending_retry` with an exponential backoff.
//! Nothing waits in memory: [`GenericRetryTrigger::run`] polls for due retries,
//! claims them, rebuilds the message from the stored payload and sends it again.
//! A failed retry is written back as `failed`, which re-enters the trigger.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use relay_common::config::AppConfig;
use relay_common::error::AppError;
use relay_common::types::{
    DeliveryChannel, GenericNotification, GenericStatus, NotificationPayload, TemplateParameter,
};
use relay_notifier::{Channels, SendResult};

use crate::retry::{self, RetryKind, Transition};

/// Input for a new generic notification. The payload must be complete.
#[derive(Debug, Clone)]
pub struct NewGenericNotification {
    pub channel: DeliveryChannel,
    pub status: GenericStatus,
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub recipient_email: Option<String>,
    pub payload: NotificationPayload,
    pub error_message: Option<String>,
}

/// A message rebuilt from a stored notification, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMessage {
    Template {
        to: String,
        template_name: String,
        parameters: Vec<TemplateParameter>,
    },
    Email {
        to: String,
        subject: String,
        html: String,
    },
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Check that `payload` carries everything `channel` needs to redeliver it.
pub fn resolve(
    channel: DeliveryChannel,
    payload: &NotificationPayload,
    recipient_phone: Option<&str>,
    recipient_email: Option<&str>,
) -> Result<ResolvedMessage, String> {
    match (channel, payload) {
        (
            DeliveryChannel::Whatsapp,
            NotificationPayload::Template {
                template_name,
                parameters,
            },
        ) => {
            if template_name.trim().is_empty() {
                return Err("template payload has no template name".to_string());
            }
            let to = non_empty(recipient_phone)
                .ok_or_else(|| "whatsapp notification has no recipient phone".to_string())?;
            Ok(ResolvedMessage::Template {
                to,
                template_name: template_name.clone(),
                parameters: parameters.clone(),
            })
        }
        (DeliveryChannel::Email, NotificationPayload::Email { subject, html }) => {
            if subject.trim().is_empty() || html.trim().is_empty() {
                return Err("email payload needs both subject and html".to_string());
            }
            let to = non_empty(recipient_email)
                .ok_or_else(|| "email notification has no recipient address".to_string())?;
            Ok(ResolvedMessage::Email {
                to,
                subject: subject.clone(),
                html: html.clone(),
            })
        }
        (channel, _) => Err(format!("payload kind does not match channel {}", channel)),
    }
}

/// Decode and check a stored notification's payload.
pub fn resolve_stored(notification: &GenericNotification) -> Result<ResolvedMessage, String> {
    let payload: NotificationPayload = serde_json::from_value(notification.payload.clone())
        .map_err(|e| format!("incomplete payload: {}", e))?;
    resolve(
        notification.channel,
        &payload,
        notification.recipient_phone.as_deref(),
        notification.recipient_email.as_deref(),
    )
}

pub struct GenericNotificationService;

impl GenericNotificationService {
    /// Persist a new notification. Rejects payloads that could not be redelivered.
    pub async fn create(
        pool: &PgPool,
        params: &NewGenericNotification,
    ) -> Result<GenericNotification, AppError> {
        if !matches!(params.status, GenericStatus::Pending | GenericStatus::Failed) {
            return Err(AppError::Validation(format!(
                "new notifications start as pending or failed, not {}",
                params.status
            )));
        }

        resolve(
            params.channel,
            &params.payload,
            params.recipient_phone.as_deref(),
            params.recipient_email.as_deref(),
        )
        .map_err(AppError::Validation)?;

        let payload = serde_json::to_value(&params.payload)?;

        let notification: GenericNotification = sqlx::query_as(
            r#"
            INSERT INTO generic_notifications (
                id, status, retry_count, channel, recipient_name, recipient_phone,
                recipient_email, payload, error_message
            )
            VALUES ($1, $2, 0, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.status.to_string())
        .bind(params.channel.to_string())
        .bind(&params.recipient_name)
        .bind(&params.recipient_phone)
        .bind(&params.recipient_email)
        .bind(&payload)
        .bind(&params.error_message)
        .fetch_one(pool)
        .await?;

        tracing::info!(
            notification_id = %notification.id,
            channel = %notification.channel,
            status = %notification.status,
            "Generic notification created"
        );

        Ok(notification)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<GenericNotification, AppError> {
        sqlx::query_as("SELECT * FROM generic_notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Generic notification {} not found", id)))
    }
}

/// Result of applying the trigger to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Status was not `failed`.
    Ignored,
    RetryScheduled { retry_count: i32, at: DateTime<Utc> },
    PermanentlyFailed,
    /// The row changed between read and conditional update.
    LostRace,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenericRunSummary {
    pub released: u64,
    pub triggered: u32,
    pub due: u32,
    pub sent: u32,
    pub failed: u32,
    pub invalid_payload: u32,
    pub skipped: u32,
    /// Sent or failed, but the claim was gone when writing the result.
    pub claim_lost: u32,
    pub errors: u32,
}

pub struct GenericRetryTrigger {
    pool: PgPool,
    channels: Channels,
    batch_size: i64,
    claim_timeout: Duration,
}

impl GenericRetryTrigger {
    pub fn new(pool: PgPool, channels: Channels, batch_size: i64, claim_timeout: Duration) -> Self {
        Self {
            pool,
            channels,
            batch_size,
            claim_timeout,
        }
    }

    pub fn from_config(pool: PgPool, channels: Channels, config: &AppConfig) -> Self {
        Self::new(
            pool,
            channels,
            config.generic_retry_batch_size,
            Duration::minutes(config.claim_timeout_minutes),
        )
    }

    /// React to a write of notification `id`.
    pub async fn on_write(&self, id: Uuid, now: DateTime<Utc>) -> Result<TriggerOutcome, AppError> {
        let notification: Option<GenericNotification> =
            sqlx::query_as("SELECT * FROM generic_notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match notification {
            Some(n) => self.apply(&n, now).await,
            None => Ok(TriggerOutcome::Ignored),
        }
    }

    async fn apply(
        &self,
        notification: &GenericNotification,
        now: DateTime<Utc>,
    ) -> Result<TriggerOutcome, AppError> {
        if notification.status != GenericStatus::Failed {
            return Ok(TriggerOutcome::Ignored);
        }

        let outcome = match retry::after_failure(RetryKind::Generic, notification.retry_count, now) {
            Transition::Exhausted { .. } => {
                let result = sqlx::query(
                    r#"
                    UPDATE generic_notifications
                    SET status = 'permanently_failed', next_retry_time = NULL, updated_at = NOW()
                    WHERE id = $1 AND status = 'failed' AND retry_count = $2
                    "#,
                )
                .bind(notification.id)
                .bind(notification.retry_count)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 1 {
                    tracing::error!(
                        notification_id = %notification.id,
                        retry_count = notification.retry_count,
                        error = notification.error_message.as_deref().unwrap_or("unknown"),
                        "Generic notification permanently failed"
                    );
                    TriggerOutcome::PermanentlyFailed
                } else {
                    TriggerOutcome::LostRace
                }
            }
            Transition::Reschedule { retry_count, at } => {
                let result = sqlx::query(
                    r#"
                    UPDATE generic_notifications
                    SET status = 'pending_retry', retry_count = $3, next_retry_time = $4,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'failed' AND retry_count = $2
                    "#,
                )
                .bind(notification.id)
                .bind(notification.retry_count)
                .bind(retry_count)
                .bind(at)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 1 {
                    tracing::info!(
                        notification_id = %notification.id,
                        retry_count,
                        next_retry_time = %at,
                        "Generic notification retry scheduled"
                    );
                    TriggerOutcome::RetryScheduled { retry_count, at }
                } else {
                    TriggerOutcome::LostRace
                }
            }
        };

        Ok(outcome)
    }

    /// One poll: recover stale claims, catch up on missed triggers, deliver due retries.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<GenericRunSummary, AppError> {
        let mut summary = GenericRunSummary {
            released: self.release_stale_claims(now).await?,
            ..Default::default()
        };

        let failed: Vec<GenericNotification> = sqlx::query_as(
            r#"
            SELECT * FROM generic_notifications
            WHERE status = 'failed'
            ORDER BY updated_at ASC
            LIMIT $1
            "#,
        )
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await?;

        for notification in &failed {
            match self.apply(notification, now).await {
                Ok(TriggerOutcome::Ignored) | Ok(TriggerOutcome::LostRace) => {}
                Ok(_) => summary.triggered += 1,
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(notification_id = %notification.id, error = %e, "Retry trigger failed");
                }
            }
        }

        let due: Vec<GenericNotification> = sqlx::query_as(
            r#"
            SELECT * FROM generic_notifications
            WHERE status = 'pending_retry' AND next_retry_time <= $1
            ORDER BY next_retry_time ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await?;
        summary.due = due.len() as u32;

        for notification in &due {
            if let Err(e) = self.retry_one(notification, now, &mut summary).await {
                summary.errors += 1;
                tracing::error!(notification_id = %notification.id, error = %e, "Generic retry failed");
            }
        }

        if summary.due > 0 || summary.triggered > 0 || summary.released > 0 {
            tracing::info!(
                triggered = summary.triggered,
                due = summary.due,
                sent = summary.sent,
                failed = summary.failed,
                invalid_payload = summary.invalid_payload,
                skipped = summary.skipped,
                claim_lost = summary.claim_lost,
                errors = summary.errors,
                released = summary.released,
                "Generic retry run finished"
            );
        }

        Ok(summary)
    }

    async fn release_stale_claims(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE generic_notifications
            SET status = 'pending_retry', claim_token = NULL, claimed_at = NULL, updated_at = NOW()
            WHERE status = 'processing' AND claimed_at < $1
            "#,
        )
        .bind(now - self.claim_timeout)
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected();
        if released > 0 {
            tracing::warn!(released, "Released stale generic notification claims");
        }
        Ok(released)
    }

    async fn retry_one(
        &self,
        notification: &GenericNotification,
        now: DateTime<Utc>,
        summary: &mut GenericRunSummary,
    ) -> Result<(), AppError> {
        let token = Uuid::new_v4();
        let claimed: Option<GenericNotification> = sqlx::query_as(
            r#"
            UPDATE generic_notifications
            SET status = 'processing', claim_token = $2, claimed_at = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending_retry' AND next_retry_time <= $3
            RETURNING *
            "#,
        )
        .bind(notification.id)
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(claimed) = claimed else {
            summary.skipped += 1;
            return Ok(());
        };

        let message = match resolve_stored(&claimed) {
            Ok(m) => m,
            Err(reason) => {
                sqlx::query(
                    r#"
                    UPDATE generic_notifications
                    SET status = 'permanently_failed', error_message = $3, claim_token = NULL,
                        next_retry_time = NULL, updated_at = NOW()
                    WHERE id = $1 AND status = 'processing' AND claim_token = $2
                    "#,
                )
                .bind(claimed.id)
                .bind(token)
                .bind(&reason)
                .execute(&self.pool)
                .await?;

                summary.invalid_payload += 1;
                tracing::error!(
                    notification_id = %claimed.id,
                    reason = %reason,
                    "Generic notification cannot be redelivered"
                );
                return Ok(());
            }
        };

        let result = self.send(&message).await;

        if result.success {
            let written = sqlx::query(
                r#"
                UPDATE generic_notifications
                SET status = 'sent', sent_at = $3, error_message = NULL, claim_token = NULL,
                    next_retry_time = NULL, updated_at = NOW()
                WHERE id = $1 AND status = 'processing' AND claim_token = $2
                "#,
            )
            .bind(claimed.id)
            .bind(token)
            .bind(now)
            .execute(&self.pool)
            .await?;

            if written.rows_affected() == 0 {
                summary.claim_lost += 1;
                tracing::warn!(
                    notification_id = %claimed.id,
                    "Claim lost before delivery result was written"
                );
                return Ok(());
            }

            summary.sent += 1;
            tracing::info!(
                notification_id = %claimed.id,
                channel = %claimed.channel,
                retry_count = claimed.retry_count,
                "Generic notification delivered on retry"
            );
            return Ok(());
        }

        let error = result.error.unwrap_or_else(|| "unknown error".to_string());
        let written: Option<GenericNotification> = sqlx::query_as(
            r#"
            UPDATE generic_notifications
            SET status = 'failed', error_message = $3, claim_token = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND claim_token = $2
            RETURNING *
            "#,
        )
        .bind(claimed.id)
        .bind(token)
        .bind(&error)
        .fetch_optional(&self.pool)
        .await?;

        let Some(failed) = written else {
            summary.claim_lost += 1;
            tracing::warn!(
                notification_id = %claimed.id,
                error = %error,
                "Claim lost before failure was written"
            );
            return Ok(());
        };

        summary.failed += 1;
        tracing::warn!(
            notification_id = %claimed.id,
            retry_count = claimed.retry_count,
            error = %error,
            "Generic notification retry failed"
        );

        self.apply(&failed, now).await?;

        Ok(())
    }

    async fn send(&self, message: &ResolvedMessage) -> SendResult {
        match message {
            ResolvedMessage::Template {
                to,
                template_name,
                parameters,
            } => self.channels.send_template(to, template_name, parameters).await,
            ResolvedMessage::Email { to, subject, html } => {
                self.channels.send_email(to, subject, html).await
            }
        }
    }
}
