use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Blockout, Booking, BookingStatus, Resource, Service, Slot, WeeklyAvailability};

/// Widest date range a single slot listing may cover.
pub const MAX_SLOT_RANGE_DAYS: i64 = 62;

/// Largest slot step a caller may ask for.
pub const MAX_STEP_MINUTES: i64 = 24 * 60;

/// Everything known about one resource for the requested range.
#[derive(Debug, Clone)]
pub struct ResourceSchedule {
    pub resource_id: String,
    pub rules: Vec<WeeklyAvailability>,
    pub bookings: Vec<Booking>,
    pub blockouts: Vec<Blockout>,
}

impl ResourceSchedule {
    fn is_open(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.rules.iter().any(|rule| rule.covers(start, end))
    }
}

/// Sorted, merged busy intervals of one resource.
struct BusyIndex {
    intervals: Vec<(NaiveDateTime, NaiveDateTime)>,
}

impl BusyIndex {
    fn build(schedule: &ResourceSchedule) -> Self {
        let mut raw: Vec<(NaiveDateTime, NaiveDateTime)> = schedule
            .bookings
            .iter()
            .filter(|b| b.status != BookingStatus::Cancelled)
            .map(|b| (b.start_time, b.end_time))
            .chain(schedule.blockouts.iter().map(|b| (b.start_time, b.end_time)))
            .collect();
        raw.sort();

        let mut intervals: Vec<(NaiveDateTime, NaiveDateTime)> = Vec::with_capacity(raw.len());
        for (start, end) in raw {
            match intervals.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => intervals.push((start, end)),
            }
        }
        Self { intervals }
    }

    fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        let idx = self.intervals.partition_point(|(_, busy_end)| *busy_end <= start);
        self.intervals
            .get(idx)
            .map_or(false, |(busy_start, _)| *busy_start < end)
    }
}

/// Bookable slots of `service` in `[range_start, range_end)`, ordered by start
/// time and then by the order of `schedules`.
pub fn compute_slots(
    service: &Service,
    schedules: &[ResourceSchedule],
    range_start: NaiveDateTime,
    range_end: NaiveDateTime,
    step: Duration,
) -> Vec<Slot> {
    let duration = service.duration();
    if step <= Duration::zero() || duration <= Duration::zero() {
        return vec![];
    }

    let indexed: Vec<(&ResourceSchedule, BusyIndex)> = schedules
        .iter()
        .map(|schedule| (schedule, BusyIndex::build(schedule)))
        .collect();

    let mut slots = vec![];
    let mut cursor = range_start;
    while let Some(end) = cursor.checked_add_signed(duration) {
        if end > range_end {
            break;
        }
        for (schedule, busy) in &indexed {
            if schedule.is_open(cursor, end) && !busy.overlaps(cursor, end) {
                slots.push(Slot {
                    start: cursor,
                    end,
                    resource_id: schedule.resource_id.clone(),
                });
            }
        }
        cursor = match cursor.checked_add_signed(step) {
            Some(next) => next,
            None => break,
        };
    }
    slots
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub resource_id: Option<String>,
    pub step: Option<i64>,
}

/// Lists open slots for a service over whole calendar days, hiding any that
/// start before `now`.
pub fn get_slots(
    conn: &Connection,
    service_id: &str,
    query: &SlotQuery,
    default_step_minutes: i64,
    now: NaiveDateTime,
) -> Result<Vec<Slot>, AppError> {
    if query.end_date < query.start_date {
        return Err(AppError::Validation(
            "end_date must not be before start_date".to_string(),
        ));
    }
    let days = (query.end_date - query.start_date).num_days() + 1;
    if days > MAX_SLOT_RANGE_DAYS {
        return Err(AppError::Validation(format!(
            "date range may span at most {MAX_SLOT_RANGE_DAYS} days"
        )));
    }
    let step_minutes = query.step.unwrap_or(default_step_minutes);
    if !(1..=MAX_STEP_MINUTES).contains(&step_minutes) {
        return Err(AppError::Validation(format!(
            "step must be between 1 and {MAX_STEP_MINUTES} minutes"
        )));
    }

    let service = queries::get_service(conn, service_id)?
        .ok_or_else(|| AppError::NotFound(format!("service {service_id}")))?;

    let mut resources = queries::get_service_resources(conn, service_id)?;
    if let Some(filter) = &query.resource_id {
        resources.retain(|r| &r.id == filter);
        if resources.is_empty() {
            return Err(AppError::NotFound(format!(
                "resource {filter} for service {service_id}"
            )));
        }
    }

    let range_start = query.start_date.and_time(chrono::NaiveTime::MIN);
    let range_end = range_start
        .checked_add_signed(Duration::days(days))
        .ok_or_else(|| AppError::Validation("date range is out of bounds".to_string()))?;
    let schedules = load_schedules(conn, &resources, range_start, range_end)?;

    let slots = compute_slots(
        &service,
        &schedules,
        range_start,
        range_end,
        Duration::minutes(step_minutes),
    );

    tracing::debug!(
        service_id,
        resources = schedules.len(),
        slots = slots.len(),
        "computed availability"
    );

    Ok(slots.into_iter().filter(|slot| slot.start >= now).collect())
}

/// Snapshot of rules, bookings and blockouts for each resource, in the given order.
pub fn load_schedules(
    conn: &Connection,
    resources: &[Resource],
    range_start: NaiveDateTime,
    range_end: NaiveDateTime,
) -> anyhow::Result<Vec<ResourceSchedule>> {
    let mut schedules = Vec::with_capacity(resources.len());
    for resource in resources {
        schedules.push(ResourceSchedule {
            resource_id: resource.id.clone(),
            rules: queries::get_availability_for_resource(conn, &resource.id)?,
            bookings: queries::get_bookings_overlapping(
                conn,
                &resource.id,
                &range_start,
                &range_end,
                None,
            )?,
            blockouts: queries::get_blockouts_overlapping(conn, &resource.id, &range_start, &range_end)?,
        });
    }
    Ok(schedules)
}
