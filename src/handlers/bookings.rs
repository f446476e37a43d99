use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::errors::AppError;
use crate::models::{Booking, BookingSummary};
use crate::services::lifecycle;
use crate::services::scheduling::{self, ConfirmationPolicy, NewBooking};
use crate::services::tokens::BookingLinks;
use crate::state::AppState;

#[derive(Serialize)]
pub struct BookingResponse {
    booking: Booking,
    links: BookingLinks,
}

impl BookingResponse {
    fn new(state: &AppState, booking: Booking) -> Self {
        let links = BookingLinks::for_booking(&state.config.public_base_url, &booking);
        Self { booking, links }
    }
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewBooking>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let policy = ConfirmationPolicy::from_auto_confirm(state.config.auto_confirm_bookings);
    let now = state.clock.now();

    let booking = {
        let mut db = db::lock(&state.db)?;
        scheduling::create_booking(&mut db, &body, policy, now)?
    };

    Ok((StatusCode::CREATED, Json(BookingResponse::new(&state, booking))))
}

// POST /api/bookings/confirm/:token
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<BookingSummary>, AppError> {
    let now = state.clock.now();
    let summary = {
        let mut db = db::lock(&state.db)?;
        lifecycle::confirm_by_token(&mut db, &token, now)?
    };
    Ok(Json(summary))
}

// POST /api/bookings/cancel/:token
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<BookingSummary>, AppError> {
    let now = state.clock.now();
    let summary = {
        let mut db = db::lock(&state.db)?;
        lifecycle::cancel_by_token(&mut db, &token, now)?
    };
    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub start_time: NaiveDateTime,
}

// POST /api/bookings/reschedule/:token
pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(body): Json<RescheduleRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let now = state.clock.now();
    let booking = {
        let mut db = db::lock(&state.db)?;
        lifecycle::reschedule_by_token(&mut db, &token, body.start_time, now)?
    };
    Ok(Json(BookingResponse::new(&state, booking)))
}
