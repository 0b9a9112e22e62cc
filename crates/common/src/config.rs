use std::fmt::Display;
use std::ops::RangeInclusive;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// WhatsApp Cloud API access token
    pub whatsapp_access_token: Option<String>,

    /// WhatsApp sender phone number ID
    pub whatsapp_phone_number_id: Option<String>,

    /// WhatsApp Graph API base URL, including the API version
    pub whatsapp_api_base_url: String,

    /// Language code used for every template message (default: "en")
    pub whatsapp_template_language: String,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Resend API base URL
    pub resend_api_base_url: String,

    /// Country calling code applied to national-format phone numbers (default: "60")
    pub phone_country_code: String,

    /// Upper bound for a single channel call, in seconds (default: 10)
    pub channel_timeout_secs: u64,

    /// Reminders selected per delivery run (default: 100)
    pub reminder_batch_size: i64,

    /// Pause between consecutive sends in a batch, in milliseconds (default: 500)
    pub inter_item_delay_ms: u64,

    /// Age after which an unfinished claim is released back to pending (default: 60)
    pub claim_timeout_minutes: i64,

    /// Local hour of day at which the payment reminder job runs (default: 9)
    pub payment_reminder_hour: u32,

    /// Offset of the business's local time from UTC, in hours (default: 8)
    pub local_utc_offset_hours: i32,

    /// Notification log entries older than this are swept (default: 30)
    pub log_retention_days: i64,

    /// Minimum spacing between two payment reminders for one order (default: 3)
    pub dedup_window_days: i64,

    /// Generic notifications retried per poll (default: 50)
    pub generic_retry_batch_size: i64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
            whatsapp_access_token: optional_var("WHATSAPP_ACCESS_TOKEN"),
            whatsapp_phone_number_id: optional_var("WHATSAPP_PHONE_NUMBER_ID"),
            whatsapp_api_base_url: std::env::var("WHATSAPP_API_BASE_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v21.0".to_string()),
            whatsapp_template_language: std::env::var("WHATSAPP_TEMPLATE_LANGUAGE")
                .unwrap_or_else(|_| "en".to_string()),
            resend_api_key: optional_var("RESEND_API_KEY"),
            email_from: optional_var("EMAIL_FROM"),
            resend_api_base_url: std::env::var("RESEND_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.resend.com".to_string()),
            phone_country_code: std::env::var("PHONE_COUNTRY_CODE")
                .unwrap_or_else(|_| "60".to_string()),
            channel_timeout_secs: parse_var("CHANNEL_TIMEOUT_SECS", 10)?,
            reminder_batch_size: parse_var("REMINDER_BATCH_SIZE", 100)?,
            inter_item_delay_ms: parse_var("INTER_ITEM_DELAY_MS", 500)?,
            claim_timeout_minutes: parse_var("CLAIM_TIMEOUT_MINUTES", 60)?,
            payment_reminder_hour: in_range(
                "PAYMENT_REMINDER_HOUR",
                parse_var("PAYMENT_REMINDER_HOUR", 9)?,
                0..=23,
            )?,
            local_utc_offset_hours: in_range(
                "LOCAL_UTC_OFFSET_HOURS",
                parse_var("LOCAL_UTC_OFFSET_HOURS", 8)?,
                -12..=14,
            )?,
            log_retention_days: parse_var("LOG_RETENTION_DAYS", 30)?,
            dedup_window_days: parse_var("DEDUP_WINDOW_DAYS", 3)?,
            generic_retry_batch_size: parse_var("GENERIC_RETRY_BATCH_SIZE", 50)?,
        })
    }
}

/// Read an optional variable, treating an empty value as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid {}", name, std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}

fn in_range<T>(name: &str, value: T, range: RangeInclusive<T>) -> anyhow::Result<T>
where
    T: PartialOrd + Display,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        anyhow::bail!(
            "{} must be between {} and {}, got {}",
            name,
            range.start(),
            range.end(),
            value
        )
    }
}
