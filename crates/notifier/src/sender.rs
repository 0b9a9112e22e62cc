use async_trait::async_trait;
use serde::Serialize;

use relay_common::types::{DeliveryChannel, TemplateParameter};

/// Result of one channel call. Failures never cross the boundary as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl SendResult {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Templated-message channel (WhatsApp-style).
#[async_trait]
pub trait TemplateSender: Send + Sync {
    async fn send_template(
        &self,
        to: &str,
        template_name: &str,
        parameters: &[TemplateParameter],
    ) -> SendResult;
}

/// Transactional email channel.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> SendResult;
}

/// Stand-in for a channel whose credentials are not configured.
///
/// Every call fails, so the other channel still delivers and the attempt is logged.
#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredChannel(pub DeliveryChannel);

impl UnconfiguredChannel {
    fn result(&self) -> SendResult {
        SendResult::failed(format!("{} channel not configured", self.0))
    }
}

#[async_trait]
impl TemplateSender for UnconfiguredChannel {
    async fn send_template(&self, _to: &str, _name: &str, _params: &[TemplateParameter]) -> SendResult {
        self.result()
    }
}

#[async_trait]
impl EmailSender for UnconfiguredChannel {
    async fn send_email(&self, _to: &str, _subject: &str, _html: &str) -> SendResult {
        self.result()
    }
}
