use std::env;
use std::time::Duration;

use crate::errors::AppError;
use crate::services::availability::MAX_STEP_MINUTES;
use crate::services::reminders::ReminderWindow;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub cron_secret: String,
    pub public_base_url: String,
    pub auto_confirm_bookings: bool,
    pub slot_step_minutes: i64,
    pub booking_tx_timeout_ms: u64,
    pub reminder_tick_minutes: i64,
    pub reminder_tolerance_minutes: i64,
    pub reminder_ticker_enabled: bool,
    pub notify_timeout_secs: u64,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT").unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "slotwise.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            cron_secret: env::var("CRON_SECRET").unwrap_or_default(),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            auto_confirm_bookings: parsed("AUTO_CONFIRM_BOOKINGS").unwrap_or(false),
            slot_step_minutes: parsed("SLOT_STEP_MINUTES").unwrap_or(30),
            booking_tx_timeout_ms: parsed("BOOKING_TX_TIMEOUT_MS").unwrap_or(5000),
            reminder_tick_minutes: parsed("REMINDER_TICK_MINUTES").unwrap_or(15),
            reminder_tolerance_minutes: parsed("REMINDER_TOLERANCE_MINUTES").unwrap_or(20),
            reminder_ticker_enabled: parsed("REMINDER_TICKER_ENABLED").unwrap_or(false),
            notify_timeout_secs: parsed("NOTIFY_TIMEOUT_SECS").unwrap_or(10),
            email_api_url: env::var("EMAIL_API_URL").unwrap_or_default(),
            email_api_key: env::var("EMAIL_API_KEY").unwrap_or_default(),
            email_from: env::var("EMAIL_FROM").unwrap_or_default(),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=MAX_STEP_MINUTES).contains(&self.slot_step_minutes) {
            return Err(AppError::Config(format!(
                "SLOT_STEP_MINUTES must be between 1 and {MAX_STEP_MINUTES}"
            )));
        }
        if self.notify_timeout_secs == 0 {
            return Err(AppError::Config("NOTIFY_TIMEOUT_SECS must be positive".to_string()));
        }
        if self.booking_tx_timeout_ms == 0 {
            return Err(AppError::Config("BOOKING_TX_TIMEOUT_MS must be positive".to_string()));
        }
        self.reminder_window()?;
        Ok(())
    }

    pub fn reminder_window(&self) -> Result<ReminderWindow, AppError> {
        let minutes = |name: &str, value: i64| {
            chrono::Duration::try_minutes(value)
                .ok_or_else(|| AppError::Config(format!("{name} is out of range")))
        };
        ReminderWindow::new(
            minutes("REMINDER_TICK_MINUTES", self.reminder_tick_minutes)?,
            minutes("REMINDER_TOLERANCE_MINUTES", self.reminder_tolerance_minutes)?,
        )
        .map(|window| window.with_send_timeout(self.notify_timeout()))
        .map_err(|e| AppError::Config(e.to_string()))
    }

    /// Upper bound on a single outbound notification request.
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    pub fn booking_tx_timeout(&self) -> Duration {
        Duration::from_millis(self.booking_tx_timeout_ms)
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
