use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;

use crate::db;
use crate::errors::AppError;
use crate::models::Slot;
use crate::services::availability::{self, SlotQuery};
use crate::state::AppState;

#[derive(Serialize)]
pub struct SlotsResponse {
    service_id: String,
    slots: Vec<Slot>,
}

// GET /api/services/:id/slots?start_date=&end_date=&resource_id=&step=
pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    Path(service_id): Path<String>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let now = state.clock.now();
    let slots = {
        let db = db::lock(&state.db)?;
        availability::get_slots(&db, &service_id, &query, state.config.slot_step_minutes, now)?
    };

    Ok(Json(SlotsResponse { service_id, slots }))
}
