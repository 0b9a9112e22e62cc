mod jobs;
mod listener;

use std::sync::Arc;
use std::time::Duration;

use relay_common::config::AppConfig;
use relay_common::db;
use relay_common::redis_pool;
use relay_common::types::DeliveryChannel;
use relay_engine::delivery::{DeliverySettings, DeliveryProcessor};
use relay_engine::generic_retry::GenericRetryTrigger;
use relay_engine::payment::PaymentReminderService;
use relay_notifier::{
    Channels, EmailSender, PhoneNormalizer, ResendConfig, ResendEmailSender, TemplateSender,
    UnconfiguredChannel, WhatsAppConfig, WhatsAppTemplateSender,
};

use jobs::{
    GenericRetryJob, JobScheduler, LogRetentionJob, PaymentReminderJob, ReminderDeliveryJob,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

fn build_channels(config: &AppConfig) -> anyhow::Result<Channels> {
    let timeout = Duration::from_secs(config.channel_timeout_secs);

    let template: Arc<dyn TemplateSender> = match (
        &config.whatsapp_access_token,
        &config.whatsapp_phone_number_id,
    ) {
        (Some(token), Some(phone_id)) => Arc::new(WhatsAppTemplateSender::new(
            WhatsAppConfig {
                access_token: token.clone(),
                phone_number_id: phone_id.clone(),
                api_base_url: config.whatsapp_api_base_url.clone(),
                language_code: config.whatsapp_template_language.clone(),
            },
            PhoneNormalizer::new(config.phone_country_code.clone()),
            timeout,
        )?),
        _ => {
            tracing::warn!("WhatsApp credentials missing, channel disabled");
            Arc::new(UnconfiguredChannel(DeliveryChannel::Whatsapp))
        }
    };

    let email: Arc<dyn EmailSender> = match (&config.resend_api_key, &config.email_from) {
        (Some(key), Some(from)) => Arc::new(ResendEmailSender::new(
            ResendConfig {
                api_key: key.clone(),
                from: from.clone(),
                api_base_url: config.resend_api_base_url.clone(),
            },
            timeout,
        )?),
        _ => {
            tracing::warn!("Resend credentials missing, channel disabled");
            Arc::new(UnconfiguredChannel(DeliveryChannel::Email))
        }
    };

    Ok(Channels::new(template, email, timeout))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relay_worker=info,relay_engine=info,relay_notifier=info".into()
            }),
        )
        .json()
        .init();

    tracing::info!("Reminder Relay worker starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let redis = redis_pool::create_redis_pool(&config.redis_url).await?;

    let channels = build_channels(&config)?;

    let processor = Arc::new(DeliveryProcessor::new(
        pool.clone(),
        channels.clone(),
        DeliverySettings::from_config(&config),
    ));
    let payments = Arc::new(PaymentReminderService::from_config(
        pool.clone(),
        channels.clone(),
        &config,
    ));
    let trigger = Arc::new(GenericRetryTrigger::from_config(
        pool.clone(),
        channels,
        &config,
    ));

    let mut scheduler = JobScheduler::new();
    scheduler.register(ReminderDeliveryJob::new(processor, redis.clone()));
    scheduler.register(PaymentReminderJob::new(
        payments,
        redis.clone(),
        config.payment_reminder_hour,
        config.local_utc_offset_hours,
    ));
    scheduler.register(LogRetentionJob::new(
        pool.clone(),
        redis.clone(),
        config.log_retention_days,
        config.local_utc_offset_hours,
    ));
    scheduler.register(GenericRetryJob::new(
        Arc::clone(&trigger),
        redis,
        jobs::generic_retry_lease_ttl(
            config.generic_retry_batch_size,
            Duration::from_secs(config.channel_timeout_secs),
        ),
    ));
    scheduler.start();

    let listener_shutdown = scheduler.shutdown_signal();
    let listener_pool = pool.clone();
    scheduler.track(tokio::spawn(async move {
        if let Err(e) = listener::run(listener_pool, trigger, listener_shutdown).await {
            tracing::error!(error = %e, "Notification listener exited with error");
        }
    }));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");

    scheduler.shutdown();
    scheduler.wait_for_shutdown(SHUTDOWN_TIMEOUT).await;
    pool.close().await;

    tracing::info!("Reminder Relay worker stopped.");
    Ok(())
}
