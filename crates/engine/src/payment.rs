//! Daily payment reminders with a per-order deduplication window.
//!
//! Unlike collection reminders there is no per-reminder state: the notification
//! log is the memory. An order whose latest `payment_reminder` entry is younger
//! than the window is skipped for this run.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use relay_common::config::AppConfig;
use relay_common::error::AppError;
use relay_common::types::{NotificationType, Order};
use relay_notifier::{Channels, Envelope};

use crate::notification_log::{NewLogEntry, NotificationLogService};
use crate::orders::OrderRepository;
use crate::render;

/// True when no earlier reminder exists or the latest one is at least `window` old.
pub fn should_send(last_sent: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    match last_sent {
        Some(at) => now - at >= window,
        None => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Suppressed,
    NoCustomer,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaymentRunSummary {
    pub orders: u32,
    pub suppressed: u32,
    pub no_customer: u32,
    pub sent: u32,
    pub failed: u32,
    pub errors: u32,
}

pub struct PaymentReminderService {
    pool: PgPool,
    channels: Channels,
    dedup_window: Duration,
    inter_item_delay: StdDuration,
}

impl PaymentReminderService {
    pub fn new(
        pool: PgPool,
        channels: Channels,
        dedup_window: Duration,
        inter_item_delay: StdDuration,
    ) -> Self {
        Self {
            pool,
            channels,
            dedup_window,
            inter_item_delay,
        }
    }

    pub fn from_config(pool: PgPool, channels: Channels, config: &AppConfig) -> Self {
        Self::new(
            pool,
            channels,
            Duration::days(config.dedup_window_days),
            StdDuration::from_millis(config.inter_item_delay_ms),
        )
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<PaymentRunSummary, AppError> {
        let orders = OrderRepository::find_with_outstanding_balance(&self.pool).await?;
        let mut summary = PaymentRunSummary {
            orders: orders.len() as u32,
            ..Default::default()
        };

        for (index, order) in orders.iter().enumerate() {
            match self.remind(order, now).await {
                Ok(outcome) => {
                    match outcome {
                        PaymentOutcome::Suppressed => summary.suppressed += 1,
                        PaymentOutcome::NoCustomer => summary.no_customer += 1,
                        PaymentOutcome::Sent => summary.sent += 1,
                        PaymentOutcome::Failed => summary.failed += 1,
                    }
                    let dispatched = matches!(outcome, PaymentOutcome::Sent | PaymentOutcome::Failed);
                    if dispatched && index + 1 < orders.len() && !self.inter_item_delay.is_zero() {
                        tokio::time::sleep(self.inter_item_delay).await;
                    }
                }
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(order_id = %order.id, error = %e, "Payment reminder failed");
                }
            }
        }

        tracing::info!(
            orders = summary.orders,
            sent = summary.sent,
            failed = summary.failed,
            suppressed = summary.suppressed,
            no_customer = summary.no_customer,
            errors = summary.errors,
            "Payment reminder run finished"
        );

        Ok(summary)
    }

    async fn remind(&self, order: &Order, now: DateTime<Utc>) -> Result<PaymentOutcome, AppError> {
        let last = NotificationLogService::latest_for_order(
            &self.pool,
            &order.id,
            NotificationType::PaymentReminder,
        )
        .await?;

        if !should_send(last.map(|e| e.created_at), now, self.dedup_window) {
            tracing::debug!(order_id = %order.id, "Payment reminder inside dedup window");
            return Ok(PaymentOutcome::Suppressed);
        }

        let Some(customer) = OrderRepository::find_customer(&self.pool, &order.customer_id).await?
        else {
            tracing::warn!(
                order_id = %order.id,
                customer_id = %order.customer_id,
                "Customer missing for payment reminder"
            );
            return Ok(PaymentOutcome::NoCustomer);
        };

        let message =
            render::render_payment_reminder(&customer.name, &order.id, order.outstanding_balance_cents);

        let report = self
            .channels
            .dispatch(&Envelope {
                phone: customer.phone.as_deref(),
                template_name: message.template_name,
                parameters: &message.parameters,
                email: customer.email.as_deref(),
                subject: &message.subject,
                html: &message.html,
            })
            .await;

        let entry = NewLogEntry {
            notification_type: NotificationType::PaymentReminder,
            customer_id: Some(customer.id.clone()),
            recipient_phone: customer.phone.clone(),
            recipient_email: customer.email.clone(),
            order_id: Some(order.id.clone()),
            reminder_id: None,
        }
        .with_report(&report, now);

        NotificationLogService::append(&self.pool, &entry).await?;

        if report.any_success() {
            tracing::info!(
                order_id = %order.id,
                channels = %entry.channel,
                "Payment reminder sent"
            );
            Ok(PaymentOutcome::Sent)
        } else {
            Ok(PaymentOutcome::Failed)
        }
    }
}
