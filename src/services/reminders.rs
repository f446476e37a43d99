use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{Channel, CustomerInfo, ReminderConfig, ReminderLogStatus};
use crate::services::messaging::{NotificationSender, ReminderTemplate};
use crate::services::tokens::BookingLinks;
use crate::state::AppState;

/// How often ticks run and how far past `now + offset` each tick looks.
///
/// A tolerance at least as long as the tick period leaves no gap between
/// consecutive windows, so every booking is seen by some tick. Each send is
/// cut off after `send_timeout` and logged as failed.
#[derive(Debug, Clone, Copy)]
pub struct ReminderWindow {
    tick_period: Duration,
    tolerance: Duration,
    send_timeout: std::time::Duration,
}

const DEFAULT_SEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

impl ReminderWindow {
    pub fn new(tick_period: Duration, tolerance: Duration) -> Result<Self, AppError> {
        if tick_period <= Duration::zero() {
            return Err(AppError::Validation(
                "reminder tick period must be positive".to_string(),
            ));
        }
        if tolerance < tick_period {
            return Err(AppError::Validation(format!(
                "reminder tolerance ({}m) must not be shorter than the tick period ({}m)",
                tolerance.num_minutes(),
                tick_period.num_minutes()
            )));
        }
        Ok(Self {
            tick_period,
            tolerance,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        })
    }

    pub fn with_send_timeout(self, send_timeout: std::time::Duration) -> Self {
        Self {
            send_timeout,
            ..self
        }
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn send_timeout(&self) -> std::time::Duration {
        self.send_timeout
    }

    /// Inclusive start-time bounds for a reminder sent `offset` ahead, or
    /// `None` past the end of the calendar.
    pub fn bounds(
        &self,
        now: NaiveDateTime,
        offset: Duration,
    ) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let target_start = now.checked_add_signed(offset)?;
        let target_end = target_start.checked_add_signed(self.tolerance)?;
        Some((target_start, target_end))
    }
}

impl Default for ReminderWindow {
    fn default() -> Self {
        Self {
            tick_period: Duration::minutes(15),
            tolerance: Duration::minutes(20),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub sent: usize,
    pub failed: usize,
}

struct DueReminder {
    config: ReminderConfig,
    candidate: queries::ReminderCandidate,
}

/// Sends every reminder that is due at `now` and logs each outcome.
///
/// The connection is only locked while reading candidates and writing a log
/// row, never while a send is in flight.
pub async fn run_reminder_tick(
    db: &Mutex<Connection>,
    sender: &dyn NotificationSender,
    window: &ReminderWindow,
    base_url: &str,
    now: NaiveDateTime,
) -> Result<TickReport, AppError> {
    let due = {
        let conn = db::lock(db)?;
        collect_due(&conn, window, now)?
    };

    let mut report = TickReport::default();
    for DueReminder { config, candidate } in &due {
        let booking = &candidate.booking;
        let outcome = match recipient_for(config.channel, &booking.customer) {
            Some(to) => {
                let links = BookingLinks::for_booking(base_url, booking);
                let template = ReminderTemplate {
                    booking_id: booking.id.clone(),
                    customer_name: booking.customer.name.clone(),
                    company_name: candidate.company_name.clone(),
                    service_name: candidate.service_name.clone(),
                    start_time: booking.start_time,
                    cancel_url: links.cancel,
                    reschedule_url: links.reschedule,
                };
                let send = sender.send(config.channel, to, &template);
                match tokio::time::timeout(window.send_timeout(), send).await {
                    Ok(sent) => sent.map_err(|e| format!("{e:#}")),
                    Err(_) => Err(format!("send timed out after {:?}", window.send_timeout())),
                }
            }
            None => Err("no recipient for channel".to_string()),
        };

        let (status, error) = match &outcome {
            Ok(()) => {
                report.sent += 1;
                (ReminderLogStatus::Success, None)
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    booking_id = %booking.id,
                    reminder_config_id = %config.id,
                    channel = config.channel.as_str(),
                    error = %e,
                    "reminder send failed"
                );
                (ReminderLogStatus::Failed, Some(e.as_str()))
            }
        };

        let logged = db::lock(db).and_then(|conn| {
            queries::insert_reminder_log(&conn, &booking.id, &config.id, config.channel, status, error, &now)
                .map_err(AppError::from)
        });
        if let Err(e) = logged {
            tracing::error!(booking_id = %booking.id, error = %e, "failed to record reminder outcome");
        }
    }

    Ok(report)
}

fn collect_due(
    conn: &Connection,
    window: &ReminderWindow,
    now: NaiveDateTime,
) -> Result<Vec<DueReminder>, AppError> {
    let mut due = vec![];
    for config in queries::get_active_reminder_configs(conn)? {
        let Some((target_start, target_end)) =
            config.offset().and_then(|offset| window.bounds(now, offset))
        else {
            tracing::warn!(
                reminder_config_id = %config.id,
                time_value = config.time_value,
                time_unit = config.time_unit.as_str(),
                "reminder offset out of range, skipping config"
            );
            continue;
        };
        let candidates = queries::get_reminder_candidates(conn, &config, &target_start, &target_end)?;
        due.extend(candidates.into_iter().map(|candidate| DueReminder {
            config: config.clone(),
            candidate,
        }));
    }
    Ok(due)
}

fn recipient_for(channel: Channel, customer: &CustomerInfo) -> Option<&str> {
    let recipient = match channel {
        Channel::Email => customer.email.as_deref(),
        Channel::Sms => customer.phone.as_deref(),
    };
    recipient.filter(|r| !r.trim().is_empty())
}

/// Runs one tick against the shared state. Overlapping calls are refused.
pub async fn tick_once(state: &AppState) -> Result<TickReport, AppError> {
    let _running = state
        .reminder_tick
        .try_lock()
        .map_err(|_| AppError::Busy("reminder tick"))?;

    let window = state.config.reminder_window()?;
    let report = run_reminder_tick(
        &state.db,
        state.notifier.as_ref(),
        &window,
        &state.config.public_base_url,
        state.clock.now(),
    )
    .await?;

    if report.sent + report.failed > 0 {
        tracing::info!(sent = report.sent, failed = report.failed, "reminder tick finished");
    }
    Ok(report)
}

/// Background task that runs a tick every tick period.
pub async fn run_ticker(state: Arc<AppState>) {
    let period = state
        .config
        .reminder_window()
        .map(|w| w.tick_period())
        .unwrap_or_else(|_| ReminderWindow::default().tick_period());
    let period = period.to_std().unwrap_or(std::time::Duration::from_secs(900));

    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        match tick_once(&state).await {
            Ok(_) => {}
            Err(AppError::Busy(_)) => tracing::debug!("reminder tick skipped, previous one still running"),
            Err(e) => tracing::error!(error = %e, "reminder tick failed"),
        }
    }
}
