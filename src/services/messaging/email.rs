use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{MessagingProvider, ReminderTemplate};

/// Posts reminder data to a transactional email API that owns the templates.
pub struct HttpEmailProvider {
    api_url: String,
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl HttpEmailProvider {
    pub fn new(api_url: String, api_key: String, from: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build email HTTP client")?;
        Ok(Self {
            api_url,
            api_key,
            from,
            client,
        })
    }
}

#[async_trait]
impl MessagingProvider for HttpEmailProvider {
    async fn send_message(&self, to: &str, template: &ReminderTemplate) -> anyhow::Result<()> {
        let body = json!({
            "from": self.from,
            "to": to,
            "template": "booking_reminder",
            "data": template,
        });

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to call email API")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("email API error ({}): {}", status, detail);
        }

        Ok(())
    }
}
