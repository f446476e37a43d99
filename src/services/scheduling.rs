use chrono::{Duration, NaiveDateTime, SubsecRound};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, CustomerInfo};
use crate::services::tokens::mint_token;

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub service_id: String,
    pub resource_id: String,
    pub start_time: NaiveDateTime,
    pub customer: CustomerInfo,
    pub notes: Option<String>,
}

/// Whether new bookings wait for the customer's confirmation link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPolicy {
    RequireConfirmation,
    AutoConfirm,
}

impl ConfirmationPolicy {
    pub fn from_auto_confirm(auto_confirm: bool) -> Self {
        if auto_confirm {
            ConfirmationPolicy::AutoConfirm
        } else {
            ConfirmationPolicy::RequireConfirmation
        }
    }
}

/// Opens a write transaction that holds SQLite's reserved lock from the
/// first statement, so a check and the write that follows it cannot interleave
/// with another writer.
pub fn begin_guarded(conn: &mut Connection) -> Result<Transaction<'_>, AppError> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(lock_error)
}

pub fn commit(tx: Transaction<'_>) -> Result<(), AppError> {
    tx.commit().map_err(lock_error)
}

fn lock_error(err: rusqlite::Error) -> AppError {
    if AppError::is_lock_timeout(&err) {
        tracing::warn!(error = %err, "timed out waiting for booking lock");
        AppError::Conflict("timed out waiting for the booking lock".to_string())
    } else {
        AppError::Database(err)
    }
}

pub fn create_booking(
    conn: &mut Connection,
    request: &NewBooking,
    policy: ConfirmationPolicy,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    if request.customer.name.trim().is_empty() {
        return Err(AppError::Validation("customer name is required".to_string()));
    }
    if request.customer.email.is_none() && request.customer.phone.is_none() {
        return Err(AppError::Validation(
            "customer email or phone is required".to_string(),
        ));
    }
    // Stored timestamps carry whole seconds only.
    let start = request.start_time.trunc_subsecs(0);
    if start < now {
        return Err(AppError::Validation("start time is in the past".to_string()));
    }

    let tx = begin_guarded(conn)?;

    let service = queries::get_service(&tx, &request.service_id)?
        .ok_or_else(|| AppError::NotFound(format!("service {}", request.service_id)))?;
    if !queries::is_resource_eligible(&tx, &service.id, &request.resource_id)? {
        return Err(AppError::NotFound(format!(
            "resource {} for service {}",
            request.resource_id, service.id
        )));
    }

    let end = end_of(start, service.duration())?;
    ensure_within_hours(&tx, &request.resource_id, start, end)?;
    ensure_interval_free(&tx, &request.resource_id, start, end, None)?;

    let (status, confirmation_token) = match policy {
        ConfirmationPolicy::RequireConfirmation => (BookingStatus::Pending, Some(mint_token())),
        ConfirmationPolicy::AutoConfirm => (BookingStatus::Confirmed, None),
    };

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        company_id: service.company_id.clone(),
        service_id: service.id.clone(),
        resource_id: request.resource_id.clone(),
        start_time: start,
        end_time: end,
        status,
        customer: request.customer.clone(),
        notes: request.notes.clone(),
        confirmation_token,
        cancellation_token: Some(mint_token()),
        reschedule_token: Some(mint_token()),
        created_at: now,
        updated_at: now,
    };
    queries::insert_booking(&tx, &booking)?;
    commit(tx)?;

    tracing::info!(
        booking_id = %booking.id,
        resource_id = %booking.resource_id,
        start = %booking.start_time,
        status = booking.status.as_str(),
        "booking created"
    );
    Ok(booking)
}

/// Moves `booking` to `new_start`, keeping its duration, inside the caller's
/// guarded transaction. The booking's own interval does not count as busy.
/// Issues and stores a fresh reschedule token.
pub fn reschedule_in(
    tx: &Transaction<'_>,
    booking: &Booking,
    new_start: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let new_start = new_start.trunc_subsecs(0);
    if new_start < now {
        return Err(AppError::Validation("start time is in the past".to_string()));
    }
    let new_end = end_of(new_start, booking.end_time - booking.start_time)?;

    ensure_within_hours(tx, &booking.resource_id, new_start, new_end)?;
    ensure_interval_free(tx, &booking.resource_id, new_start, new_end, Some(&booking.id))?;

    let token = mint_token();
    queries::move_booking(tx, &booking.id, &new_start, &new_end, Some(&token), &now)?;

    Ok(Booking {
        start_time: new_start,
        end_time: new_end,
        reschedule_token: Some(token),
        updated_at: now,
        ..booking.clone()
    })
}

fn end_of(start: NaiveDateTime, duration: Duration) -> Result<NaiveDateTime, AppError> {
    start
        .checked_add_signed(duration)
        .ok_or_else(|| AppError::Validation(format!("start time {start} is out of range")))
}

fn ensure_within_hours(
    conn: &Connection,
    resource_id: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<(), AppError> {
    let rules = queries::get_availability_for_resource(conn, resource_id)?;
    if rules.iter().any(|rule| rule.covers(start, end)) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} to {} is outside working hours",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%H:%M")
        )))
    }
}

/// Fails with `Conflict` when a non-cancelled booking or a blockout on the
/// resource overlaps `[start, end)`.
pub fn ensure_interval_free(
    conn: &Connection,
    resource_id: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    exclude_booking: Option<&str>,
) -> Result<(), AppError> {
    let bookings = queries::get_bookings_overlapping(conn, resource_id, &start, &end, exclude_booking)?;
    if let Some(existing) = bookings.first() {
        tracing::debug!(resource_id, existing = %existing.id, "interval taken by booking");
        return Err(AppError::Conflict(format!(
            "{} is already booked at {}",
            resource_id,
            existing.start_time.format("%Y-%m-%d %H:%M")
        )));
    }

    let blockouts = queries::get_blockouts_overlapping(conn, resource_id, &start, &end)?;
    if let Some(blockout) = blockouts.first() {
        return Err(AppError::Conflict(format!(
            "{} is blocked from {} to {}",
            resource_id,
            blockout.start_time.format("%Y-%m-%d %H:%M"),
            blockout.end_time.format("%Y-%m-%d %H:%M")
        )));
    }
    Ok(())
}
