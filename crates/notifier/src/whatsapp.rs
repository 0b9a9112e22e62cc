//! WhatsApp Business Cloud API template sender.
//!
//! Reminders go out as pre-approved template messages; free-form text is only
//! allowed inside a customer-initiated session, which reminders never are.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use relay_common::types::TemplateParameter;

use crate::phone::PhoneNormalizer;
use crate::sender::{SendResult, TemplateSender};

/// WhatsApp Business channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Graph API access token
    pub access_token: String,
    /// Sending phone number ID
    pub phone_number_id: String,
    /// Graph API base URL including version, e.g. `https://graph.facebook.com/v21.0`
    pub api_base_url: String,
    /// Template language code
    pub language_code: String,
}

/// Sends template messages through the WhatsApp Cloud API.
pub struct WhatsAppTemplateSender {
    config: WhatsAppConfig,
    normalizer: PhoneNormalizer,
    client: reqwest::Client,
}

impl WhatsAppTemplateSender {
    pub fn new(
        config: WhatsAppConfig,
        normalizer: PhoneNormalizer,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            config,
            normalizer,
            client,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }

    fn template_body(
        &self,
        to: &str,
        template_name: &str,
        parameters: &[TemplateParameter],
    ) -> serde_json::Value {
        let params: Vec<serde_json::Value> = parameters
            .iter()
            .map(|p| {
                serde_json::json!({
                    "type": "text",
                    "parameter_name": p.name,
                    "text": p.value,
                })
            })
            .collect();

        serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "template",
            "template": {
                "name": template_name,
                "language": { "code": self.config.language_code },
                "components": [
                    { "type": "body", "parameters": params }
                ]
            }
        })
    }
}

#[async_trait]
impl TemplateSender for WhatsAppTemplateSender {
    async fn send_template(
        &self,
        to: &str,
        template_name: &str,
        parameters: &[TemplateParameter],
    ) -> SendResult {
        let destination = match self.normalizer.normalize(to) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected WhatsApp destination");
                return SendResult::failed(format!("invalid destination: {e}"));
            }
        };

        let body = self.template_body(&destination, template_name, parameters);

        let response = match self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return SendResult::failed(format!("WhatsApp API request failed: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return SendResult::failed(format!("WhatsApp API error {}: {}", status, error_text));
        }

        let result: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return SendResult::failed(format!("Invalid WhatsApp response: {e}")),
        };

        let message_id = result["messages"][0]["id"].as_str().map(str::to_string);
        tracing::debug!(
            template = template_name,
            message_id = message_id.as_deref().unwrap_or("unknown"),
            "WhatsApp template sent"
        );

        SendResult::delivered(message_id)
    }
}
