use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// "Notify `time_value` `time_unit`s before the appointment" for one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    pub id: String,
    pub company_id: String,
    pub time_value: i64,
    pub time_unit: TimeUnit,
    pub channel: Channel,
    pub is_active: bool,
}

impl ReminderConfig {
    /// `None` when the offset does not fit in a `Duration`.
    pub fn offset(&self) -> Option<Duration> {
        self.time_unit.to_duration(self.time_value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minutes" => Some(TimeUnit::Minutes),
            "hours" => Some(TimeUnit::Hours),
            "days" => Some(TimeUnit::Days),
            _ => None,
        }
    }

    pub fn to_duration(&self, value: i64) -> Option<Duration> {
        match self {
            TimeUnit::Minutes => Duration::try_minutes(value),
            TimeUnit::Hours => Duration::try_hours(value),
            TimeUnit::Days => Duration::try_days(value),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Channel::Email),
            "sms" => Some(Channel::Sms),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReminderLogStatus {
    Success,
    Failed,
}

impl ReminderLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderLogStatus::Success => "success",
            ReminderLogStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ReminderLogStatus::Success),
            "failed" => Some(ReminderLogStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderLog {
    pub id: i64,
    pub booking_id: String,
    pub reminder_config_id: String,
    pub channel: Channel,
    pub status: ReminderLogStatus,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
}
