use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::services::reminders::{self, TickReport};
use crate::state::AppState;

// POST /api/cron/reminders
pub async fn run_reminders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TickReport>, AppError> {
    check_auth(&headers, &state.config.cron_secret)?;
    let report = reminders::tick_once(&state).await?;
    Ok(Json(report))
}
