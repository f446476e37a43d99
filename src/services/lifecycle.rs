use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, BookingSummary, TokenKind};
use crate::services::scheduling::{begin_guarded, commit, reschedule_in};

/// Confirms a pending booking. The token works once; afterwards, and for
/// bookings that are no longer pending or have already started, the link
/// reports `Expired`.
pub fn confirm_by_token(
    conn: &mut Connection,
    token: &str,
    now: NaiveDateTime,
) -> Result<BookingSummary, AppError> {
    let tx = begin_guarded(conn)?;
    let booking = find_by_token(&tx, TokenKind::Confirmation, token)?;

    if booking.status != BookingStatus::Pending || booking.start_time <= now {
        return Err(AppError::Expired);
    }

    if !queries::confirm_booking(&tx, &booking.id, &now)? {
        return Err(AppError::Expired);
    }
    queries::record_consumed_token(&tx, token, &booking.id, TokenKind::Confirmation, &now)?;

    let summary = summarize(
        &tx,
        &Booking {
            status: BookingStatus::Confirmed,
            ..booking
        },
    )?;
    commit(tx)?;

    tracing::info!(booking_id = %summary.booking_id, "booking confirmed");
    Ok(summary)
}

/// Cancels a pending or confirmed booking. Repeating the call on a cancelled
/// booking succeeds without touching it.
pub fn cancel_by_token(
    conn: &mut Connection,
    token: &str,
    now: NaiveDateTime,
) -> Result<BookingSummary, AppError> {
    let tx = begin_guarded(conn)?;
    let booking = find_by_token(&tx, TokenKind::Cancellation, token)?;

    let booking = match booking.status {
        BookingStatus::Cancelled => booking,
        BookingStatus::Completed | BookingStatus::NoShow => return Err(AppError::Expired),
        BookingStatus::Pending | BookingStatus::Confirmed => {
            queries::update_booking_status(&tx, &booking.id, BookingStatus::Cancelled, &now)?;
            tracing::info!(booking_id = %booking.id, "booking cancelled");
            Booking {
                status: BookingStatus::Cancelled,
                updated_at: now,
                ..booking
            }
        }
    };

    let summary = summarize(&tx, &booking)?;
    commit(tx)?;
    Ok(summary)
}

/// Moves an active booking to `new_start`. On success the presented token is
/// spent and the returned booking carries its replacement; on conflict the
/// token stays valid.
pub fn reschedule_by_token(
    conn: &mut Connection,
    token: &str,
    new_start: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let tx = begin_guarded(conn)?;
    let booking = find_by_token(&tx, TokenKind::Reschedule, token)?;

    if !booking.status.is_active() || booking.start_time <= now {
        return Err(AppError::Expired);
    }

    let moved = reschedule_in(&tx, &booking, new_start, now)?;
    queries::record_consumed_token(&tx, token, &booking.id, TokenKind::Reschedule, &now)?;
    commit(tx)?;

    tracing::info!(
        booking_id = %moved.id,
        from = %booking.start_time,
        to = %moved.start_time,
        "booking rescheduled"
    );
    Ok(moved)
}

pub fn complete_booking(
    conn: &mut Connection,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    transition(conn, booking_id, BookingStatus::Completed, now)
}

pub fn mark_no_show(
    conn: &mut Connection,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    transition(conn, booking_id, BookingStatus::NoShow, now)
}

fn transition(
    conn: &mut Connection,
    booking_id: &str,
    next: BookingStatus,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let tx = begin_guarded(conn)?;
    let booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    if !booking.status.can_transition_to(next) {
        return Err(AppError::Validation(format!(
            "invalid status transition from {} to {}",
            booking.status.as_str(),
            next.as_str()
        )));
    }

    queries::update_booking_status(&tx, booking_id, next, &now)?;
    commit(tx)?;

    tracing::info!(booking_id, status = next.as_str(), "booking status changed");
    Ok(Booking {
        status: next,
        updated_at: now,
        ..booking
    })
}

fn find_by_token(conn: &Connection, kind: TokenKind, token: &str) -> Result<Booking, AppError> {
    if let Some(booking) = queries::get_booking_by_token(conn, kind, token)? {
        return Ok(booking);
    }
    if queries::is_token_consumed(conn, token, kind)? {
        Err(AppError::Expired)
    } else {
        Err(AppError::NotFound(format!("{} link", kind.as_str())))
    }
}

pub fn summarize(conn: &Connection, booking: &Booking) -> Result<BookingSummary, AppError> {
    let service_name = queries::get_service(conn, &booking.service_id)?
        .map(|s| s.name)
        .unwrap_or_default();
    let company_name = queries::get_company(conn, &booking.company_id)?
        .map(|c| c.name)
        .unwrap_or_default();

    Ok(BookingSummary {
        booking_id: booking.id.clone(),
        status: booking.status,
        start_time: booking.start_time,
        end_time: booking.end_time,
        service_name,
        company_name,
    })
}
