use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use slotwise::clock::SystemClock;
use slotwise::config::AppConfig;
use slotwise::db;
use slotwise::handlers;
use slotwise::services::messaging::ChannelRouter;
use slotwise::services::reminders;
use slotwise::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    config.validate()?;

    if config.cron_secret.is_empty() {
        tracing::warn!("CRON_SECRET is not set, /api/cron/reminders will refuse every call");
    }

    let conn = db::open_db(&config.database_url, config.booking_tx_timeout())?;
    let notifier = ChannelRouter::from_config(&config)?;

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        notifier: Box::new(notifier),
        clock: Arc::new(SystemClock),
        reminder_tick: tokio::sync::Mutex::new(()),
    });

    if config.reminder_ticker_enabled {
        tracing::info!(
            every_minutes = config.reminder_tick_minutes,
            tolerance_minutes = config.reminder_tolerance_minutes,
            "starting in-process reminder ticker"
        );
        tokio::spawn(reminders::run_ticker(Arc::clone(&state)));
    }

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
