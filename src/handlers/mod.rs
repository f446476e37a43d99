pub mod admin;
pub mod bookings;
pub mod cron;
pub mod health;
pub mod slots;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/services/:id/slots", get(slots::get_slots))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/confirm/:token", post(bookings::confirm_booking))
        .route("/api/bookings/cancel/:token", post(bookings::cancel_booking))
        .route(
            "/api/bookings/reschedule/:token",
            post(bookings::reschedule_booking),
        )
        .route("/api/cron/reminders", post(cron::run_reminders))
        .route("/api/admin/companies", post(admin::create_company))
        .route("/api/admin/resources", post(admin::create_resource))
        .route("/api/admin/services", post(admin::create_service))
        .route(
            "/api/admin/resources/:id/availability",
            post(admin::add_availability),
        )
        .route(
            "/api/admin/resources/:id/blockouts",
            post(admin::add_blockout),
        )
        .route(
            "/api/admin/reminder-configs",
            post(admin::create_reminder_config),
        )
        .route("/api/admin/bookings", get(admin::get_bookings))
        .route(
            "/api/admin/bookings/:id/complete",
            post(admin::complete_booking),
        )
        .route(
            "/api/admin/bookings/:id/no-show",
            post(admin::mark_no_show),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bearer-token check. An unset secret locks the route rather than opening it.
pub(crate) fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_check_auth() {
        assert!(check_auth(&headers("Bearer secret"), "secret").is_ok());
        assert!(check_auth(&headers("Bearer wrong"), "secret").is_err());
        assert!(check_auth(&headers("secret"), "secret").is_err());
        assert!(check_auth(&HeaderMap::new(), "secret").is_err());
    }

    #[test]
    fn test_empty_secret_rejects_everything() {
        assert!(check_auth(&headers("Bearer "), "").is_err());
        assert!(check_auth(&HeaderMap::new(), "").is_err());
    }
}
