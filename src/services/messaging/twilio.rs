use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use super::{MessagingProvider, ReminderTemplate};

pub struct TwilioSmsProvider {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl TwilioSmsProvider {
    pub fn new(
        account_sid: String,
        auth_token: String,
        from_number: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Twilio HTTP client")?;
        Ok(Self {
            account_sid,
            auth_token,
            from_number,
            client,
        })
    }
}

pub fn sms_body(template: &ReminderTemplate) -> String {
    let mut body = format!(
        "Reminder: {} at {} on {}.",
        template.service_name,
        template.company_name,
        template.start_time.format("%a %b %-d, %H:%M"),
    );
    if let Some(url) = &template.cancel_url {
        body.push_str(&format!(" Cancel: {url}"));
    }
    body
}

#[async_trait]
impl MessagingProvider for TwilioSmsProvider {
    async fn send_message(&self, to: &str, template: &ReminderTemplate) -> anyhow::Result<()> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let body = sms_body(template);

        self.client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body.as_str())])
            .send()
            .await
            .context("failed to send Twilio SMS")?
            .error_for_status()
            .context("Twilio API returned error")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn test_sms_body() {
        let template = ReminderTemplate {
            booking_id: "bk".to_string(),
            customer_name: "Alice".to_string(),
            company_name: "Bob's Barbershop".to_string(),
            service_name: "Haircut".to_string(),
            start_time: NaiveDateTime::parse_from_str("2025-06-16 14:00", "%Y-%m-%d %H:%M").unwrap(),
            cancel_url: Some("https://book.example/booking/cancel/abc".to_string()),
            reschedule_url: None,
        };
        let body = sms_body(&template);
        assert!(body.starts_with("Reminder: Haircut at Bob's Barbershop on Mon Jun 16, 14:00."));
        assert!(body.ends_with("Cancel: https://book.example/booking/cancel/abc"));
    }
}
