use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::models::{
    Blockout, Booking, BookingStatus, Company, ReminderConfig, Resource, Service,
    WeeklyAvailability,
};
use crate::services::catalog::{
    self, NewAvailability, NewBlockout, NewCompany, NewReminderConfig, NewResource, NewService,
};
use crate::services::lifecycle;
use crate::state::AppState;

type Created<T> = (StatusCode, Json<T>);

// POST /api/admin/companies
pub async fn create_company(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewCompany>,
) -> Result<Created<Company>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let company = {
        let db = db::lock(&state.db)?;
        catalog::create_company(&db, &body)?
    };
    tracing::info!(company_id = %company.id, "company created");
    Ok((StatusCode::CREATED, Json(company)))
}

// POST /api/admin/resources
pub async fn create_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewResource>,
) -> Result<Created<Resource>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let resource = {
        let db = db::lock(&state.db)?;
        catalog::create_resource(&db, &body)?
    };
    Ok((StatusCode::CREATED, Json(resource)))
}

#[derive(Serialize)]
pub struct ServiceResponse {
    #[serde(flatten)]
    service: Service,
    resource_ids: Vec<String>,
}

// POST /api/admin/services
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewService>,
) -> Result<Created<ServiceResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let service = {
        let db = db::lock(&state.db)?;
        catalog::create_service(&db, &body)?
    };
    Ok((
        StatusCode::CREATED,
        Json(ServiceResponse {
            service,
            resource_ids: body.resource_ids,
        }),
    ))
}

// POST /api/admin/resources/:id/availability
pub async fn add_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(resource_id): Path<String>,
    Json(body): Json<NewAvailability>,
) -> Result<Created<WeeklyAvailability>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let rule = {
        let db = db::lock(&state.db)?;
        catalog::add_availability(&db, &resource_id, &body)?
    };
    Ok((StatusCode::CREATED, Json(rule)))
}

// POST /api/admin/resources/:id/blockouts
pub async fn add_blockout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(resource_id): Path<String>,
    Json(body): Json<NewBlockout>,
) -> Result<Created<Blockout>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let blockout = {
        let db = db::lock(&state.db)?;
        catalog::add_blockout(&db, &resource_id, &body)?
    };
    Ok((StatusCode::CREATED, Json(blockout)))
}

// POST /api/admin/reminder-configs
pub async fn create_reminder_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewReminderConfig>,
) -> Result<Created<ReminderConfig>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let config = {
        let db = db::lock(&state.db)?;
        catalog::create_reminder_config(&db, &body)?
    };
    Ok((StatusCode::CREATED, Json(config)))
}

#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

// GET /api/admin/bookings
pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let status_filter = match query.status.as_deref() {
        Some(raw) => Some(
            BookingStatus::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("unknown status: {raw}")))?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    let bookings = {
        let db = db::lock(&state.db)?;
        queries::get_all_bookings(&db, status_filter, limit)?
    };
    Ok(Json(bookings))
}

// POST /api/admin/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let now = state.clock.now();
    let booking = {
        let mut db = db::lock(&state.db)?;
        lifecycle::complete_booking(&mut db, &id, now)?
    };
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/no-show
pub async fn mark_no_show(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let now = state.clock.now();
    let booking = {
        let mut db = db::lock(&state.db)?;
        lifecycle::mark_no_show(&mut db, &id, now)?
    };
    Ok(Json(booking))
}
