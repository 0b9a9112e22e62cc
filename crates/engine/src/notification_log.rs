//! Append-only notification log.
//!
//! One row per delivery attempt. Rows are never updated; the only deletion is the
//! retention sweep.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use relay_common::error::AppError;
use relay_common::types::{AttemptStatus, NotificationLogEntry, NotificationType};
use relay_notifier::DispatchReport;

/// Fields of a log row before it is written.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub notification_type: NotificationType,
    pub customer_id: Option<String>,
    pub recipient_phone: Option<String>,
    pub recipient_email: Option<String>,
    pub order_id: Option<String>,
    pub reminder_id: Option<Uuid>,
}

impl NewLogEntry {
    /// Complete the row from a dispatch report.
    pub fn with_report(self, report: &DispatchReport, at: DateTime<Utc>) -> NotificationLogEntry {
        let status = if report.any_success() {
            AttemptStatus::Sent
        } else {
            AttemptStatus::Failed
        };

        NotificationLogEntry {
            id: Uuid::new_v4(),
            notification_type: self.notification_type,
            channel: report.attempted(),
            customer_id: self.customer_id,
            recipient_phone: self.recipient_phone,
            recipient_email: self.recipient_email,
            order_id: self.order_id,
            reminder_id: self.reminder_id,
            whatsapp_success: report.whatsapp_success(),
            email_success: report.email_success(),
            status,
            error_message: report.error_summary(),
            created_at: at,
        }
    }
}

pub struct NotificationLogService;

impl NotificationLogService {
    pub async fn append(pool: &PgPool, entry: &NotificationLogEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO notification_logs (
                id, notification_type, channel, customer_id, recipient_phone, recipient_email,
                order_id, reminder_id, whatsapp_success, email_success, status, error_message,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.id)
        .bind(entry.notification_type.to_string())
        .bind(&entry.channel)
        .bind(&entry.customer_id)
        .bind(&entry.recipient_phone)
        .bind(&entry.recipient_email)
        .bind(&entry.order_id)
        .bind(entry.reminder_id)
        .bind(entry.whatsapp_success)
        .bind(entry.email_success)
        .bind(entry.status.to_string())
        .bind(&entry.error_message)
        .bind(entry.created_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Most recent entry of `notification_type` for an order.
    pub async fn latest_for_order(
        pool: &PgPool,
        order_id: &str,
        notification_type: NotificationType,
    ) -> Result<Option<NotificationLogEntry>, AppError> {
        let entry: Option<NotificationLogEntry> = sqlx::query_as(
            r#"
            SELECT * FROM notification_logs
            WHERE order_id = $1 AND notification_type = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .bind(notification_type.to_string())
        .fetch_optional(pool)
        .await?;

        Ok(entry)
    }

    pub async fn list_for_reminder(
        pool: &PgPool,
        reminder_id: Uuid,
    ) -> Result<Vec<NotificationLogEntry>, AppError> {
        let entries: Vec<NotificationLogEntry> = sqlx::query_as(
            "SELECT * FROM notification_logs WHERE reminder_id = $1 ORDER BY created_at ASC",
        )
        .bind(reminder_id)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }

    /// Delete entries older than `retention_days`. Returns the number removed.
    pub async fn sweep(
        pool: &PgPool,
        retention_days: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let cutoff = now - Duration::days(retention_days);
        let result = sqlx::query("DELETE FROM notification_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(deleted, retention_days, "Swept old notification log entries");
        }

        Ok(deleted)
    }
}
