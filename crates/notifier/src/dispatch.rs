//! Timeout-bounded, two-channel fan-out.

use std::sync::Arc;
use std::time::Duration;

use relay_common::types::{DeliveryChannel, TemplateParameter};

use crate::sender::{EmailSender, SendResult, TemplateSender};

/// A rendered message for both channels. Absent recipients skip their channel.
#[derive(Debug, Clone)]
pub struct Envelope<'a> {
    pub phone: Option<&'a str>,
    pub template_name: &'a str,
    pub parameters: &'a [TemplateParameter],
    pub email: Option<&'a str>,
    pub subject: &'a str,
    pub html: &'a str,
}

/// Per-channel results of one dispatch. `None` means the channel was not attempted.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub whatsapp: Option<SendResult>,
    pub email: Option<SendResult>,
}

impl DispatchReport {
    pub fn whatsapp_success(&self) -> bool {
        self.whatsapp.as_ref().is_some_and(|r| r.success)
    }

    pub fn email_success(&self) -> bool {
        self.email.as_ref().is_some_and(|r| r.success)
    }

    pub fn any_success(&self) -> bool {
        self.whatsapp_success() || self.email_success()
    }

    /// Highest-priority channel that delivered.
    pub fn delivered_channel(&self) -> Option<DeliveryChannel> {
        if self.whatsapp_success() {
            Some(DeliveryChannel::Whatsapp)
        } else if self.email_success() {
            Some(DeliveryChannel::Email)
        } else {
            None
        }
    }

    /// Attempted channels in log notation: `whatsapp`, `email`, `whatsapp+email` or `none`.
    pub fn attempted(&self) -> String {
        match (self.whatsapp.is_some(), self.email.is_some()) {
            (true, true) => "whatsapp+email".to_string(),
            (true, false) => DeliveryChannel::Whatsapp.to_string(),
            (false, true) => DeliveryChannel::Email.to_string(),
            (false, false) => "none".to_string(),
        }
    }

    /// Joined error text of the failed channels, if any failed or none was attempted.
    pub fn error_summary(&self) -> Option<String> {
        let mut errors = Vec::new();
        for (channel, result) in [
            (DeliveryChannel::Whatsapp, &self.whatsapp),
            (DeliveryChannel::Email, &self.email),
        ] {
            if let Some(r) = result {
                if !r.success {
                    let detail = r.error.as_deref().unwrap_or("unknown error");
                    errors.push(format!("{channel}: {detail}"));
                }
            }
        }

        if self.whatsapp.is_none() && self.email.is_none() {
            errors.push("no recipient phone or email".to_string());
        }

        if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        }
    }
}

/// Both channel senders behind a shared per-call timeout.
#[derive(Clone)]
pub struct Channels {
    template: Arc<dyn TemplateSender>,
    email: Arc<dyn EmailSender>,
    timeout: Duration,
}

impl Channels {
    pub fn new(
        template: Arc<dyn TemplateSender>,
        email: Arc<dyn EmailSender>,
        timeout: Duration,
    ) -> Self {
        Self {
            template,
            email,
            timeout,
        }
    }

    pub async fn send_template(
        &self,
        to: &str,
        template_name: &str,
        parameters: &[TemplateParameter],
    ) -> SendResult {
        match tokio::time::timeout(
            self.timeout,
            self.template.send_template(to, template_name, parameters),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => SendResult::failed(format!(
                "whatsapp send timed out after {}s",
                self.timeout.as_secs_f32()
            )),
        }
    }

    pub async fn send_email(&self, to: &str, subject: &str, html: &str) -> SendResult {
        match tokio::time::timeout(self.timeout, self.email.send_email(to, subject, html)).await {
            Ok(result) => result,
            Err(_) => SendResult::failed(format!(
                "email send timed out after {}s",
                self.timeout.as_secs_f32()
            )),
        }
    }

    /// Attempt every channel that has a recipient, each independently of the other.
    pub async fn dispatch(&self, envelope: &Envelope<'_>) -> DispatchReport {
        let mut report = DispatchReport::default();

        if let Some(phone) = present(envelope.phone) {
            let result = self
                .send_template(phone, envelope.template_name, envelope.parameters)
                .await;
            if !result.success {
                tracing::warn!(
                    template = envelope.template_name,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "WhatsApp delivery failed"
                );
            }
            report.whatsapp = Some(result);
        }

        if let Some(email) = present(envelope.email) {
            let result = self.send_email(email, envelope.subject, envelope.html).await;
            if !result.success {
                tracing::warn!(
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Email delivery failed"
                );
            }
            report.email = Some(result);
        }

        report
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTemplate {
        calls: AtomicUsize,
        succeed: bool,
        delay: Duration,
    }

    #[async_trait]
    impl TemplateSender for FakeTemplate {
        async fn send_template(&self, _to: &str, _name: &str, _p: &[TemplateParameter]) -> SendResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.succeed {
                SendResult::delivered(Some("wamid".to_string()))
            } else {
                SendResult::failed("provider down")
            }
        }
    }

    struct FakeEmail {
        calls: AtomicUsize,
        succeed: bool,
    }

    #[async_trait]
    impl EmailSender for FakeEmail {
        async fn send_email(&self, _to: &str, _subject: &str, _html: &str) -> SendResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                SendResult::delivered(None)
            } else {
                SendResult::failed("mailbox full")
            }
        }
    }

    fn channels(
        wa_ok: bool,
        email_ok: bool,
        wa_delay: Duration,
    ) -> (Channels, Arc<FakeTemplate>, Arc<FakeEmail>) {
        let wa = Arc::new(FakeTemplate {
            calls: AtomicUsize::new(0),
            succeed: wa_ok,
            delay: wa_delay,
        });
        let email = Arc::new(FakeEmail {
            calls: AtomicUsize::new(0),
            succeed: email_ok,
        });
        let chans = Channels::new(wa.clone(), email.clone(), Duration::from_millis(100));
        (chans, wa, email)
    }

    fn envelope<'a>(phone: Option<&'a str>, email: Option<&'a str>) -> Envelope<'a> {
        Envelope {
            phone,
            template_name: "collection_reminder_7_days",
            parameters: &[],
            email,
            subject: "Reminder",
            html: "<p>hi</p>",
        }
    }

    #[tokio::test]
    async fn test_both_channels_attempted_even_when_first_succeeds() {
        let (chans, wa, email) = channels(true, true, Duration::ZERO);
        let report = chans
            .dispatch(&envelope(Some("0123456789"), Some("a@b.co")))
            .await;

        assert_eq!(wa.calls.load(Ordering::SeqCst), 1);
        assert_eq!(email.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.delivered_channel(), Some(DeliveryChannel::Whatsapp));
        assert_eq!(report.attempted(), "whatsapp+email");
        assert!(report.error_summary().is_none());
    }

    #[tokio::test]
    async fn test_email_attempted_when_whatsapp_fails() {
        let (chans, _, email) = channels(false, true, Duration::ZERO);
        let report = chans
            .dispatch(&envelope(Some("0123456789"), Some("a@b.co")))
            .await;

        assert_eq!(email.calls.load(Ordering::SeqCst), 1);
        assert!(!report.whatsapp_success());
        assert_eq!(report.delivered_channel(), Some(DeliveryChannel::Email));
        assert_eq!(
            report.error_summary().as_deref(),
            Some("whatsapp: provider down")
        );
    }

    #[tokio::test]
    async fn test_missing_recipients_skip_channels() {
        let (chans, wa, email) = channels(true, true, Duration::ZERO);
        let report = chans.dispatch(&envelope(None, Some("  "))).await;

        assert_eq!(wa.calls.load(Ordering::SeqCst), 0);
        assert_eq!(email.calls.load(Ordering::SeqCst), 0);
        assert!(!report.any_success());
        assert_eq!(report.attempted(), "none");
        assert_eq!(
            report.error_summary().as_deref(),
            Some("no recipient phone or email")
        );
    }

    #[tokio::test]
    async fn test_slow_channel_times_out_without_blocking_other() {
        let (chans, _, email) = channels(true, true, Duration::from_secs(5));
        let started = std::time::Instant::now();
        let report = chans
            .dispatch(&envelope(Some("0123456789"), Some("a@b.co")))
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!report.whatsapp_success());
        assert!(report.whatsapp.unwrap().error.unwrap().contains("timed out"));
        assert_eq!(email.calls.load(Ordering::SeqCst), 1);
    }
}
