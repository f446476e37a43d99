pub mod email;
pub mod twilio;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::AppConfig;
use crate::models::Channel;

/// Data handed to the channel provider; rendering is the provider's business.
#[derive(Debug, Clone, Serialize)]
pub struct ReminderTemplate {
    pub booking_id: String,
    pub customer_name: String,
    pub company_name: String,
    pub service_name: String,
    pub start_time: NaiveDateTime,
    pub cancel_url: Option<String>,
    pub reschedule_url: Option<String>,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        template: &ReminderTemplate,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, to: &str, template: &ReminderTemplate) -> anyhow::Result<()>;
}

/// Routes each send to the provider registered for its channel.
#[derive(Default)]
pub struct ChannelRouter {
    providers: HashMap<Channel, Box<dyn MessagingProvider>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Channel, provider: Box<dyn MessagingProvider>) -> Self {
        self.providers.insert(channel, provider);
        self
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let mut router = Self::new();

        if !config.email_api_url.is_empty() {
            tracing::info!("email reminders enabled (api: {})", config.email_api_url);
            router = router.with(
                Channel::Email,
                Box::new(email::HttpEmailProvider::new(
                    config.email_api_url.clone(),
                    config.email_api_key.clone(),
                    config.email_from.clone(),
                    config.notify_timeout(),
                )?),
            );
        }

        if !config.twilio_account_sid.is_empty() {
            tracing::info!("sms reminders enabled");
            router = router.with(
                Channel::Sms,
                Box::new(twilio::TwilioSmsProvider::new(
                    config.twilio_account_sid.clone(),
                    config.twilio_auth_token.clone(),
                    config.twilio_phone_number.clone(),
                    config.notify_timeout(),
                )?),
            );
        }

        Ok(router)
    }
}

#[async_trait]
impl NotificationSender for ChannelRouter {
    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        template: &ReminderTemplate,
    ) -> anyhow::Result<()> {
        let provider = self
            .providers
            .get(&channel)
            .ok_or_else(|| anyhow::anyhow!("no provider configured for channel {}", channel.as_str()))?;
        provider.send_message(recipient, template).await
    }
}
