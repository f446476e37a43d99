use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::availability::parse_time;
use crate::models::{
    Blockout, Booking, BookingStatus, Channel, Company, CustomerInfo, ReminderConfig, ReminderLog,
    ReminderLogStatus, Resource, ResourceKind, Service, TimeUnit, TokenKind, WeeklyAvailability,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BOOKING_COLUMNS: &str = "b.id, b.company_id, b.service_id, b.resource_id, b.start_time, b.end_time, b.status, \
     b.customer_name, b.customer_email, b.customer_phone, b.notes, \
     b.confirmation_token, b.cancellation_token, b.reschedule_token, b.created_at, b.updated_at";

pub fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid timestamp {s:?}: {e}"))
}

// ── Companies ──

pub fn insert_company(conn: &Connection, company: &Company) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO companies (id, name) VALUES (?1, ?2)",
        params![company.id, company.name],
    )?;
    Ok(())
}

pub fn get_company(conn: &Connection, id: &str) -> anyhow::Result<Option<Company>> {
    let company = conn
        .query_row(
            "SELECT id, name FROM companies WHERE id = ?1",
            params![id],
            |row| {
                Ok(Company {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(company)
}

// ── Resources ──

pub fn insert_resource(conn: &Connection, resource: &Resource) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO resources (id, company_id, name, kind) VALUES (?1, ?2, ?3, ?4)",
        params![resource.id, resource.company_id, resource.name, resource.kind.as_str()],
    )?;
    Ok(())
}

pub fn get_resource(conn: &Connection, id: &str) -> anyhow::Result<Option<Resource>> {
    let resource = conn
        .query_row(
            "SELECT id, company_id, name, kind FROM resources WHERE id = ?1",
            params![id],
            parse_resource_row,
        )
        .optional()?;
    Ok(resource)
}

fn parse_resource_row(row: &rusqlite::Row) -> rusqlite::Result<Resource> {
    let kind: String = row.get(3)?;
    Ok(Resource {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        kind: ResourceKind::parse(&kind),
    })
}

// ── Services ──

pub fn insert_service(
    conn: &Connection,
    service: &Service,
    resource_ids: &[String],
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, company_id, name, duration_minutes) VALUES (?1, ?2, ?3, ?4)",
        params![service.id, service.company_id, service.name, service.duration_minutes],
    )?;
    for (position, resource_id) in resource_ids.iter().enumerate() {
        conn.execute(
            "INSERT INTO service_resources (service_id, resource_id, position) VALUES (?1, ?2, ?3)",
            params![service.id, resource_id, position as i64],
        )?;
    }
    Ok(())
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let service = conn
        .query_row(
            "SELECT id, company_id, name, duration_minutes FROM services WHERE id = ?1",
            params![id],
            |row| {
                Ok(Service {
                    id: row.get(0)?,
                    company_id: row.get(1)?,
                    name: row.get(2)?,
                    duration_minutes: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(service)
}

/// Eligible resources of a service, in the order they were attached.
pub fn get_service_resources(conn: &Connection, service_id: &str) -> anyhow::Result<Vec<Resource>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.company_id, r.name, r.kind
         FROM service_resources sr JOIN resources r ON r.id = sr.resource_id
         WHERE sr.service_id = ?1 ORDER BY sr.position ASC, r.id ASC",
    )?;
    let rows = stmt.query_map(params![service_id], parse_resource_row)?;

    let mut resources = vec![];
    for row in rows {
        resources.push(row?);
    }
    Ok(resources)
}

pub fn is_resource_eligible(
    conn: &Connection,
    service_id: &str,
    resource_id: &str,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM service_resources WHERE service_id = ?1 AND resource_id = ?2",
        params![service_id, resource_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ── Weekly availability & blockouts ──

pub fn insert_availability(conn: &Connection, rule: &WeeklyAvailability) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO weekly_availability (id, resource_id, day_of_week, start_time, end_time, is_available)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            rule.id,
            rule.resource_id,
            rule.day_of_week,
            rule.start_time.format("%H:%M").to_string(),
            rule.end_time.format("%H:%M").to_string(),
            rule.is_available as i32,
        ],
    )?;
    Ok(())
}

pub fn get_availability_for_resource(
    conn: &Connection,
    resource_id: &str,
) -> anyhow::Result<Vec<WeeklyAvailability>> {
    let mut stmt = conn.prepare(
        "SELECT id, resource_id, day_of_week, start_time, end_time, is_available
         FROM weekly_availability WHERE resource_id = ?1 ORDER BY day_of_week, start_time",
    )?;
    let rows = stmt.query_map(params![resource_id], |row| {
        let start: String = row.get(3)?;
        let end: String = row.get(4)?;
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, u8>(2)?,
            start,
            end,
            row.get::<_, i32>(5)? != 0,
        ))
    })?;

    let mut rules = vec![];
    for row in rows {
        let (id, resource_id, day_of_week, start, end, is_available) = row?;
        rules.push(WeeklyAvailability {
            id,
            resource_id,
            day_of_week,
            start_time: parse_time(&start)?,
            end_time: parse_time(&end)?,
            is_available,
        });
    }
    Ok(rules)
}

pub fn insert_blockout(conn: &Connection, blockout: &Blockout) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO blockouts (id, resource_id, start_time, end_time, reason) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            blockout.id,
            blockout.resource_id,
            fmt_ts(&blockout.start_time),
            fmt_ts(&blockout.end_time),
            blockout.reason,
        ],
    )?;
    Ok(())
}

/// Blockouts on `resource_id` that intersect `[start, end)`.
pub fn get_blockouts_overlapping(
    conn: &Connection,
    resource_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<Vec<Blockout>> {
    let mut stmt = conn.prepare(
        "SELECT id, resource_id, start_time, end_time, reason FROM blockouts
         WHERE resource_id = ?1 AND start_time < ?3 AND end_time > ?2
         ORDER BY start_time ASC",
    )?;
    let rows = stmt.query_map(params![resource_id, fmt_ts(start), fmt_ts(end)], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut blockouts = vec![];
    for row in rows {
        let (id, resource_id, start_time, end_time, reason) = row?;
        blockouts.push(Blockout {
            id,
            resource_id,
            start_time: parse_ts(&start_time)?,
            end_time: parse_ts(&end_time)?,
            reason,
        });
    }
    Ok(blockouts)
}

// ── Bookings ──

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, company_id, service_id, resource_id, start_time, end_time, status,
                               customer_name, customer_email, customer_phone, notes,
                               confirmation_token, cancellation_token, reschedule_token, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            booking.id,
            booking.company_id,
            booking.service_id,
            booking.resource_id,
            fmt_ts(&booking.start_time),
            fmt_ts(&booking.end_time),
            booking.status.as_str(),
            booking.customer.name,
            booking.customer.email,
            booking.customer.phone,
            booking.notes,
            booking.confirmation_token,
            booking.cancellation_token,
            booking.reschedule_token,
            fmt_ts(&booking.created_at),
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;
    result.transpose()
}

/// Exact-match lookup on one of the three token columns.
pub fn get_booking_by_token(
    conn: &Connection,
    kind: TokenKind,
    token: &str,
) -> anyhow::Result<Option<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.{} = ?1",
        kind.column()
    );
    let result = conn
        .query_row(&sql, params![token], |row| Ok(parse_booking_row(row)))
        .optional()?;
    result.transpose()
}

/// Non-cancelled bookings on `resource_id` intersecting `[start, end)`.
pub fn get_bookings_overlapping(
    conn: &Connection,
    resource_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    exclude_id: Option<&str>,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b
         WHERE b.resource_id = ?1 AND b.start_time < ?3 AND b.end_time > ?2
           AND b.status != 'cancelled'
           AND (?4 IS NULL OR b.id != ?4)
         ORDER BY b.start_time ASC"
    ))?;

    let rows = stmt.query_map(
        params![resource_id, fmt_ts(start), fmt_ts(end), exclude_id],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

/// Marks the booking confirmed and burns its confirmation token.
pub fn confirm_booking(conn: &Connection, id: &str, now: &NaiveDateTime) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'confirmed', confirmation_token = NULL, updated_at = ?1
         WHERE id = ?2 AND status = 'pending'",
        params![fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn move_booking(
    conn: &Connection,
    id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    reschedule_token: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET start_time = ?1, end_time = ?2, reschedule_token = ?3, updated_at = ?4
         WHERE id = ?5",
        params![fmt_ts(start), fmt_ts(end), reschedule_token, fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn get_all_bookings(
    conn: &Connection,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b
         WHERE (?1 IS NULL OR b.status = ?1)
         ORDER BY b.start_time DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(
        params![status_filter.map(|s| s.as_str()), limit],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_time: String = row.get(4)?;
    let end_time: String = row.get(5)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;

    Ok(Booking {
        id: row.get(0)?,
        company_id: row.get(1)?,
        service_id: row.get(2)?,
        resource_id: row.get(3)?,
        start_time: parse_ts(&start_time)?,
        end_time: parse_ts(&end_time)?,
        status: BookingStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown booking status: {status}"))?,
        customer: CustomerInfo {
            name: row.get(7)?,
            email: row.get(8)?,
            phone: row.get(9)?,
        },
        notes: row.get(10)?,
        confirmation_token: row.get(11)?,
        cancellation_token: row.get(12)?,
        reschedule_token: row.get(13)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Consumed tokens ──

pub fn record_consumed_token(
    conn: &Connection,
    token: &str,
    booking_id: &str,
    kind: TokenKind,
    now: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO consumed_tokens (token, booking_id, kind, used_at) VALUES (?1, ?2, ?3, ?4)",
        params![token, booking_id, kind.as_str(), fmt_ts(now)],
    )?;
    Ok(())
}

pub fn is_token_consumed(conn: &Connection, token: &str, kind: TokenKind) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM consumed_tokens WHERE token = ?1 AND kind = ?2",
        params![token, kind.as_str()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ── Reminders ──

pub fn insert_reminder_config(conn: &Connection, config: &ReminderConfig) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO reminder_configs (id, company_id, time_value, time_unit, channel, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            config.id,
            config.company_id,
            config.time_value,
            config.time_unit.as_str(),
            config.channel.as_str(),
            config.is_active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_active_reminder_configs(conn: &Connection) -> anyhow::Result<Vec<ReminderConfig>> {
    let mut stmt = conn.prepare(
        "SELECT id, company_id, time_value, time_unit, channel, is_active
         FROM reminder_configs WHERE is_active = 1 ORDER BY company_id, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i32>(5)? != 0,
        ))
    })?;

    let mut configs = vec![];
    for row in rows {
        let (id, company_id, time_value, time_unit, channel, is_active) = row?;
        configs.push(ReminderConfig {
            id,
            company_id,
            time_value,
            time_unit: TimeUnit::parse(&time_unit)
                .ok_or_else(|| anyhow::anyhow!("unknown time unit: {time_unit}"))?,
            channel: Channel::parse(&channel)
                .ok_or_else(|| anyhow::anyhow!("unknown channel: {channel}"))?,
            is_active,
        });
    }
    Ok(configs)
}

/// A confirmed booking due for a reminder, with the names the message needs.
#[derive(Debug, Clone)]
pub struct ReminderCandidate {
    pub booking: Booking,
    pub service_name: String,
    pub company_name: String,
}

/// Confirmed bookings of the config's company starting within
/// `[window_start, window_end]` (both inclusive) that have no successful
/// reminder logged for this config yet.
pub fn get_reminder_candidates(
    conn: &Connection,
    config: &ReminderConfig,
    window_start: &NaiveDateTime,
    window_end: &NaiveDateTime,
) -> anyhow::Result<Vec<ReminderCandidate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS}, s.name, c.name FROM bookings b
         JOIN services s ON s.id = b.service_id
         JOIN companies c ON c.id = b.company_id
         WHERE b.company_id = ?1 AND b.status = 'confirmed'
           AND b.start_time >= ?2 AND b.start_time <= ?3
           AND NOT EXISTS (
               SELECT 1 FROM booking_reminder_logs l
               WHERE l.booking_id = b.id AND l.reminder_config_id = ?4 AND l.status = 'success'
           )
         ORDER BY b.start_time ASC"
    ))?;

    let rows = stmt.query_map(
        params![config.company_id, fmt_ts(window_start), fmt_ts(window_end), config.id],
        |row| {
            let service_name: String = row.get(16)?;
            let company_name: String = row.get(17)?;
            Ok(parse_booking_row(row).map(|booking| ReminderCandidate {
                booking,
                service_name,
                company_name,
            }))
        },
    )?;

    let mut candidates = vec![];
    for row in rows {
        candidates.push(row??);
    }
    Ok(candidates)
}

/// Appends a log row. Returns false when a success row for the same
/// (booking, config) already exists and the insert was skipped.
pub fn insert_reminder_log(
    conn: &Connection,
    booking_id: &str,
    config_id: &str,
    channel: Channel,
    status: ReminderLogStatus,
    error: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "INSERT OR IGNORE INTO booking_reminder_logs (booking_id, reminder_config_id, channel, status, error, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![booking_id, config_id, channel.as_str(), status.as_str(), error, fmt_ts(now)],
    )?;
    Ok(count > 0)
}

pub fn get_reminder_logs(conn: &Connection, booking_id: &str) -> anyhow::Result<Vec<ReminderLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, reminder_config_id, channel, status, error, created_at
         FROM booking_reminder_logs WHERE booking_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![booking_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut logs = vec![];
    for row in rows {
        let (id, booking_id, reminder_config_id, channel, status, error, created_at) = row?;
        logs.push(ReminderLog {
            id,
            booking_id,
            reminder_config_id,
            channel: Channel::parse(&channel)
                .ok_or_else(|| anyhow::anyhow!("unknown channel: {channel}"))?,
            status: ReminderLogStatus::parse(&status)
                .ok_or_else(|| anyhow::anyhow!("unknown reminder log status: {status}"))?,
            error,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(logs)
}
