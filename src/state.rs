use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::services::messaging::NotificationSender;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub notifier: Box<dyn NotificationSender>,
    pub clock: Arc<dyn Clock>,
    /// Held for the duration of a reminder tick so two ticks never overlap.
    pub reminder_tick: tokio::sync::Mutex<()>,
}
