//! Transactional email through the Resend HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::sender::{EmailSender, SendResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendConfig {
    pub api_key: String,
    /// Sender address, e.g. `Front Desk <noreply@example.com>`
    pub from: String,
    pub api_base_url: String,
}

pub struct ResendEmailSender {
    config: ResendConfig,
    client: reqwest::Client,
}

impl ResendEmailSender {
    pub fn new(config: ResendConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { config, client })
    }
}

/// Cheap shape check; the provider performs the real validation.
fn looks_like_email(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !address.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> SendResult {
        let to = to.trim();
        if !looks_like_email(to) {
            return SendResult::failed(format!("invalid email address '{to}'"));
        }

        let body = serde_json::json!({
            "from": self.config.from,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let url = format!("{}/emails", self.config.api_base_url.trim_end_matches('/'));
        let response = match self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return SendResult::failed(format!("Resend request failed: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return SendResult::failed(format!("Resend API error {}: {}", status, error_text));
        }

        let message_id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v["id"].as_str().map(str::to_string));

        tracing::debug!(message_id = message_id.as_deref().unwrap_or("unknown"), "Email sent");
        SendResult::delivered(message_id)
    }
}
