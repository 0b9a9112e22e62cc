use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aging milestone a collection reminder belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum ReminderType {
    #[serde(rename = "7_days")]
    #[sqlx(rename = "7_days")]
    SevenDays,
    #[serde(rename = "14_days")]
    #[sqlx(rename = "14_days")]
    FourteenDays,
    #[serde(rename = "30_days")]
    #[sqlx(rename = "30_days")]
    ThirtyDays,
    #[serde(rename = "monthly")]
    #[sqlx(rename = "monthly")]
    Monthly,
    #[serde(rename = "disposal_eligible")]
    #[sqlx(rename = "disposal_eligible")]
    DisposalEligible,
}

impl ReminderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderType::SevenDays => "7_days",
            ReminderType::FourteenDays => "14_days",
            ReminderType::ThirtyDays => "30_days",
            ReminderType::Monthly => "monthly",
            ReminderType::DisposalEligible => "disposal_eligible",
        }
    }
}

/// Lifecycle status of a [`ReminderRecord`].
///
/// `Processing` is held only while a worker owns the claim; `Sent`, `Cancelled`
/// and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Processing,
    Sent,
    Cancelled,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Processing => "processing",
            ReminderStatus::Sent => "sent",
            ReminderStatus::Cancelled => "cancelled",
            ReminderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReminderStatus::Sent | ReminderStatus::Cancelled | ReminderStatus::Failed
        )
    }
}

/// Delivery medium. Declaration order is delivery priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Whatsapp,
    Email,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::Whatsapp => "whatsapp",
            DeliveryChannel::Email => "email",
        }
    }
}

/// Kind of notification recorded in the notification log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    CollectionReminder,
    PaymentReminder,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::CollectionReminder => "collection_reminder",
            NotificationType::PaymentReminder => "payment_reminder",
        }
    }
}

/// Outcome of one logged delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Sent,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Sent => "sent",
            AttemptStatus::Failed => "failed",
        }
    }
}

/// Lifecycle status of a [`GenericNotification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GenericStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    PendingRetry,
    PermanentlyFailed,
}

impl GenericStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenericStatus::Pending => "pending",
            GenericStatus::Processing => "processing",
            GenericStatus::Sent => "sent",
            GenericStatus::Failed => "failed",
            GenericStatus::PendingRetry => "pending_retry",
            GenericStatus::PermanentlyFailed => "permanently_failed",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

display_as_str!(
    ReminderType,
    ReminderStatus,
    DeliveryChannel,
    NotificationType,
    AttemptStatus,
    GenericStatus,
);

/// A scheduled collection reminder for one (order, milestone) pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReminderRecord {
    pub id: Uuid,
    pub order_id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub reminder_type: ReminderType,
    pub scheduled_date: DateTime<Utc>,
    pub status: ReminderStatus,
    pub retry_count: i32,
    /// Channel of the successful delivery, if any
    pub channel: Option<DeliveryChannel>,
    pub sent_date: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub cancel_reason: Option<String>,
    /// Free text rendered into the email body
    pub message_content: Option<String>,
    pub claim_token: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the append-only notification log. Written once per delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationLogEntry {
    pub id: Uuid,
    pub notification_type: NotificationType,
    /// Channels attempted, e.g. `whatsapp+email`, or `none`
    pub channel: String,
    pub customer_id: Option<String>,
    pub recipient_phone: Option<String>,
    pub recipient_email: Option<String>,
    pub order_id: Option<String>,
    pub reminder_id: Option<Uuid>,
    pub whatsapp_success: bool,
    pub email_success: bool,
    pub status: AttemptStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A named, ordered template parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub name: String,
    pub value: String,
}

impl TemplateParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Everything needed to rebuild a generic notification's message on retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    Template {
        template_name: String,
        parameters: Vec<TemplateParameter>,
    },
    Email {
        subject: String,
        html: String,
    },
}

/// A channel-agnostic notification retried by the generic retry path.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GenericNotification {
    pub id: Uuid,
    pub status: GenericStatus,
    pub retry_count: i32,
    pub next_retry_time: Option<DateTime<Utc>>,
    pub channel: DeliveryChannel,
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub recipient_email: Option<String>,
    /// Serialized [`NotificationPayload`]
    pub payload: serde_json::Value,
    pub error_message: Option<String>,
    pub claim_token: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only view of an order in the external record store.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub return_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub actual_completion: Option<DateTime<Utc>>,
    pub delivery_completed_time: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub outstanding_balance_cents: i64,
}

impl Order {
    /// Best available completion timestamp: actual, then delivery, then estimate.
    pub fn completion_time(&self) -> Option<DateTime<Utc>> {
        self.actual_completion
            .or(self.delivery_completed_time)
            .or(self.estimated_completion)
    }
}

/// Read-only view of a customer in the external record store.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}
