use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::TIMESTAMP_FORMAT;
use crate::errors::AppError;
use crate::models::business::parse_timezone;
use crate::models::hours::{format_time, parse_time};
use crate::models::{
    Appointment, AppointmentEvent, AppointmentStatus, Business, CancelActor, DateOverride,
    DepositPolicy, EventType, OpenInterval, Service, Stylist, TimeOff, WeeklyHours,
};

pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn invalid_text(idx: usize, what: String) -> rusqlite::Error {
    conversion_error(idx, std::io::Error::new(std::io::ErrorKind::InvalidData, what))
}

fn ts_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| conversion_error(idx, e))
}

fn opt_ts_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => ts_at(row, idx).map(Some),
        None => Ok(None),
    }
}

fn hours_at(row: &Row, idx: usize) -> rusqlite::Result<WeeklyHours> {
    let json: String = row.get(idx)?;
    WeeklyHours::from_json(&json).map_err(|e| invalid_text(idx, e.to_string()))
}

// ── Businesses ──

pub fn get_business(conn: &Connection, id: &str) -> Result<Option<Business>, AppError> {
    let business = conn
        .query_row(
            "SELECT id, name, timezone, min_notice_hours, max_advance_days, cancellation_window_hours,
                    slot_granularity_minutes, business_hours
             FROM businesses WHERE id = ?1",
            params![id],
            |row| {
                let tz_name: String = row.get(2)?;
                let timezone = parse_timezone(&tz_name)
                    .ok_or_else(|| invalid_text(2, format!("unknown time zone: {tz_name}")))?;
                Ok(Business {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    timezone,
                    min_notice_hours: row.get(3)?,
                    max_advance_days: row.get(4)?,
                    cancellation_window_hours: row.get(5)?,
                    slot_granularity_minutes: row.get(6)?,
                    business_hours: hours_at(row, 7)?,
                })
            },
        )
        .optional()?;
    Ok(business)
}

pub fn save_business(conn: &Connection, business: &Business) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO businesses (id, name, timezone, min_notice_hours, max_advance_days,
                                 cancellation_window_hours, slot_granularity_minutes, business_hours)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           timezone = excluded.timezone,
           min_notice_hours = excluded.min_notice_hours,
           max_advance_days = excluded.max_advance_days,
           cancellation_window_hours = excluded.cancellation_window_hours,
           slot_granularity_minutes = excluded.slot_granularity_minutes,
           business_hours = excluded.business_hours",
        params![
            business.id,
            business.name,
            business.timezone.name(),
            business.min_notice_hours,
            business.max_advance_days,
            business.cancellation_window_hours,
            business.slot_granularity_minutes,
            business.business_hours.to_json(),
        ],
    )?;
    Ok(())
}

// ── Stylists ──

const STYLIST_COLUMNS: &str = "s.id, s.business_id, s.name, s.is_active, s.weekly_hours";

fn parse_stylist_row(row: &Row) -> rusqlite::Result<Stylist> {
    Ok(Stylist {
        id: row.get(0)?,
        business_id: row.get(1)?,
        name: row.get(2)?,
        is_active: row.get::<_, i32>(3)? != 0,
        weekly_hours: hours_at(row, 4)?,
    })
}

pub fn get_stylist(
    conn: &Connection,
    business_id: &str,
    id: &str,
) -> Result<Option<Stylist>, AppError> {
    let sql = format!("SELECT {STYLIST_COLUMNS} FROM stylists s WHERE s.business_id = ?1 AND s.id = ?2");
    let stylist = conn
        .query_row(&sql, params![business_id, id], parse_stylist_row)
        .optional()?;
    Ok(stylist)
}

/// Active stylists of the business who perform the service, in listing order.
pub fn list_qualified_stylists(
    conn: &Connection,
    business_id: &str,
    service_id: &str,
) -> Result<Vec<Stylist>, AppError> {
    let sql = format!(
        "SELECT {STYLIST_COLUMNS} FROM stylists s
         INNER JOIN stylist_services ss ON ss.stylist_id = s.id
         WHERE s.business_id = ?1 AND ss.service_id = ?2 AND s.is_active = 1
         ORDER BY s.name ASC, s.id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![business_id, service_id], parse_stylist_row)?;

    let mut stylists = vec![];
    for row in rows {
        stylists.push(row?);
    }
    Ok(stylists)
}

pub fn is_qualified(conn: &Connection, stylist_id: &str, service_id: &str) -> Result<bool, AppError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM stylist_services WHERE stylist_id = ?1 AND service_id = ?2",
        params![stylist_id, service_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn save_stylist(conn: &Connection, stylist: &Stylist) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO stylists (id, business_id, name, is_active, weekly_hours)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
           business_id = excluded.business_id,
           name = excluded.name,
           is_active = excluded.is_active,
           weekly_hours = excluded.weekly_hours",
        params![
            stylist.id,
            stylist.business_id,
            stylist.name,
            stylist.is_active as i32,
            stylist.weekly_hours.to_json(),
        ],
    )?;
    Ok(())
}

pub fn link_stylist_service(
    conn: &Connection,
    stylist_id: &str,
    service_id: &str,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT OR IGNORE INTO stylist_services (stylist_id, service_id) VALUES (?1, ?2)",
        params![stylist_id, service_id],
    )?;
    Ok(())
}

pub fn get_date_override(
    conn: &Connection,
    stylist_id: &str,
    date: NaiveDate,
) -> Result<Option<DateOverride>, AppError> {
    let date_str = date.format("%Y-%m-%d").to_string();
    let row = conn
        .query_row(
            "SELECT open_time, close_time FROM stylist_date_overrides WHERE stylist_id = ?1 AND date = ?2",
            params![stylist_id, date_str],
            |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?)),
        )
        .optional()?;

    let Some((open, close)) = row else {
        return Ok(None);
    };

    // A malformed override closes the day rather than falling back to weekly hours
    let hours = match (open, close) {
        (Some(open), Some(close)) => match (parse_time(&open), parse_time(&close)) {
            (Ok(open), Ok(close)) => OpenInterval::new(open, close),
            _ => None,
        },
        _ => None,
    };

    Ok(Some(DateOverride {
        stylist_id: stylist_id.to_string(),
        date,
        hours,
    }))
}

pub fn save_date_override(conn: &Connection, over: &DateOverride) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO stylist_date_overrides (stylist_id, date, open_time, close_time)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(stylist_id, date) DO UPDATE SET
           open_time = excluded.open_time,
           close_time = excluded.close_time",
        params![
            over.stylist_id,
            over.date.format("%Y-%m-%d").to_string(),
            over.hours.map(|h| format_time(h.open)),
            over.hours.map(|h| format_time(h.close)),
        ],
    )?;
    Ok(())
}

pub fn get_time_off_overlapping(
    conn: &Connection,
    stylist_id: &str,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> Result<Vec<TimeOff>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT stylist_id, starts_at, ends_at, reason FROM stylist_time_off
         WHERE stylist_id = ?1 AND starts_at < ?3 AND ends_at > ?2
         ORDER BY starts_at ASC",
    )?;
    let rows = stmt.query_map(params![stylist_id, format_ts(start), format_ts(end)], |row| {
        Ok(TimeOff {
            stylist_id: row.get(0)?,
            starts_at: ts_at(row, 1)?,
            ends_at: ts_at(row, 2)?,
            reason: row.get(3)?,
        })
    })?;

    let mut blocks = vec![];
    for row in rows {
        blocks.push(row?);
    }
    Ok(blocks)
}

pub fn insert_time_off(conn: &Connection, block: &TimeOff) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO stylist_time_off (stylist_id, starts_at, ends_at, reason) VALUES (?1, ?2, ?3, ?4)",
        params![
            block.stylist_id,
            format_ts(&block.starts_at),
            format_ts(&block.ends_at),
            block.reason,
        ],
    )?;
    Ok(())
}

// ── Services ──

pub fn get_service(
    conn: &Connection,
    business_id: &str,
    id: &str,
) -> Result<Option<Service>, AppError> {
    let service = conn
        .query_row(
            "SELECT id, business_id, name, duration_minutes, buffer_before_minutes, buffer_after_minutes,
                    deposit_required, deposit_amount_cents, base_price_cents
             FROM services WHERE business_id = ?1 AND id = ?2",
            params![business_id, id],
            |row| {
                Ok(Service {
                    id: row.get(0)?,
                    business_id: row.get(1)?,
                    name: row.get(2)?,
                    duration_minutes: row.get(3)?,
                    buffer_before_minutes: row.get(4)?,
                    buffer_after_minutes: row.get(5)?,
                    deposit: DepositPolicy {
                        required: row.get::<_, i32>(6)? != 0,
                        amount_cents: row.get(7)?,
                    },
                    base_price_cents: row.get(8)?,
                })
            },
        )
        .optional()?;
    Ok(service)
}

pub fn save_service(conn: &Connection, service: &Service) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO services (id, business_id, name, duration_minutes, buffer_before_minutes,
                               buffer_after_minutes, deposit_required, deposit_amount_cents, base_price_cents)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
           business_id = excluded.business_id,
           name = excluded.name,
           duration_minutes = excluded.duration_minutes,
           buffer_before_minutes = excluded.buffer_before_minutes,
           buffer_after_minutes = excluded.buffer_after_minutes,
           deposit_required = excluded.deposit_required,
           deposit_amount_cents = excluded.deposit_amount_cents,
           base_price_cents = excluded.base_price_cents",
        params![
            service.id,
            service.business_id,
            service.name,
            service.duration_minutes,
            service.buffer_before_minutes,
            service.buffer_after_minutes,
            service.deposit.required as i32,
            service.deposit.amount_cents,
            service.base_price_cents,
        ],
    )?;
    Ok(())
}

// ── Appointments ──

const APPOINTMENT_COLUMNS: &str = "id, business_id, stylist_id, client_id, walk_in_name, service_id, \
     start_time, end_time, reserved_start, reserved_end, status, quoted_price_cents, notes, \
     payment_reference, cancelled_at, cancelled_by, created_at, updated_at";

const ACTIVE_STATUSES_SQL: &str = "('pending', 'confirmed', 'in_progress')";

/// A reserved window (buffers included) held by an active appointment.
#[derive(Debug, Clone)]
pub struct BusyWindow {
    pub appointment_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn parse_appointment_row(row: &Row) -> rusqlite::Result<Appointment> {
    let status_str: String = row.get(10)?;
    let status = AppointmentStatus::parse(&status_str)
        .ok_or_else(|| invalid_text(10, format!("unknown appointment status: {status_str}")))?;
    let cancelled_by = row
        .get::<_, Option<String>>(15)?
        .and_then(|s| CancelActor::parse(&s));

    Ok(Appointment {
        id: row.get(0)?,
        business_id: row.get(1)?,
        stylist_id: row.get(2)?,
        client_id: row.get(3)?,
        walk_in_name: row.get(4)?,
        service_id: row.get(5)?,
        start_time: ts_at(row, 6)?,
        end_time: ts_at(row, 7)?,
        reserved_start: ts_at(row, 8)?,
        reserved_end: ts_at(row, 9)?,
        status,
        quoted_price_cents: row.get(11)?,
        notes: row.get(12)?,
        payment_reference: row.get(13)?,
        cancelled_at: opt_ts_at(row, 14)?,
        cancelled_by,
        created_at: ts_at(row, 16)?,
        updated_at: ts_at(row, 17)?,
    })
}

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), AppError> {
    conn.execute(
        &format!(
            "INSERT INTO appointments ({APPOINTMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ),
        params![
            appt.id,
            appt.business_id,
            appt.stylist_id,
            appt.client_id,
            appt.walk_in_name,
            appt.service_id,
            format_ts(&appt.start_time),
            format_ts(&appt.end_time),
            format_ts(&appt.reserved_start),
            format_ts(&appt.reserved_end),
            appt.status.as_str(),
            appt.quoted_price_cents,
            appt.notes,
            appt.payment_reference,
            appt.cancelled_at.as_ref().map(format_ts),
            appt.cancelled_by.map(|a| a.as_str()),
            format_ts(&appt.created_at),
            format_ts(&appt.updated_at),
        ],
    )?;
    Ok(())
}

/// Looks an appointment up within one business. Appointments of other tenants are invisible.
pub fn get_appointment(
    conn: &Connection,
    business_id: &str,
    id: &str,
) -> Result<Option<Appointment>, AppError> {
    let appt = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE business_id = ?1 AND id = ?2"),
            params![business_id, id],
            parse_appointment_row,
        )
        .optional()?;
    Ok(appt)
}

pub fn list_appointments(
    conn: &Connection,
    business_id: &str,
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    stylist_id: Option<&str>,
) -> Result<Vec<Appointment>, AppError> {
    let (from, to) = match range {
        Some((from, to)) => (Some(format_ts(&from)), Some(format_ts(&to))),
        None => (None, None),
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE business_id = ?1
           AND (?2 IS NULL OR start_time >= ?2)
           AND (?3 IS NULL OR start_time < ?3)
           AND (?4 IS NULL OR stylist_id = ?4)
         ORDER BY start_time ASC"
    ))?;
    let rows = stmt.query_map(params![business_id, from, to, stylist_id], parse_appointment_row)?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row?);
    }
    Ok(appointments)
}

/// Reserved windows of the stylist's active appointments intersecting `[start, end)`.
pub fn get_busy_windows(
    conn: &Connection,
    stylist_id: &str,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    exclude_appointment_id: Option<&str>,
) -> Result<Vec<BusyWindow>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, reserved_start, reserved_end FROM appointments
         WHERE stylist_id = ?1
           AND status IN {ACTIVE_STATUSES_SQL}
           AND reserved_start < ?3 AND reserved_end > ?2
           AND (?4 IS NULL OR id <> ?4)
         ORDER BY reserved_start ASC"
    ))?;
    let rows = stmt.query_map(
        params![stylist_id, format_ts(start), format_ts(end), exclude_appointment_id],
        |row| {
            Ok(BusyWindow {
                appointment_id: row.get(0)?,
                start: ts_at(row, 1)?,
                end: ts_at(row, 2)?,
            })
        },
    )?;

    let mut windows = vec![];
    for row in rows {
        windows.push(row?);
    }
    Ok(windows)
}

pub fn update_appointment_times(conn: &Connection, appt: &Appointment) -> Result<bool, AppError> {
    let count = conn.execute(
        "UPDATE appointments
         SET start_time = ?1, end_time = ?2, reserved_start = ?3, reserved_end = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            format_ts(&appt.start_time),
            format_ts(&appt.end_time),
            format_ts(&appt.reserved_start),
            format_ts(&appt.reserved_end),
            format_ts(&appt.updated_at),
            appt.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn update_appointment_status(conn: &Connection, appt: &Appointment) -> Result<bool, AppError> {
    let count = conn.execute(
        "UPDATE appointments
         SET status = ?1, payment_reference = ?2, cancelled_at = ?3, cancelled_by = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            appt.status.as_str(),
            appt.payment_reference,
            appt.cancelled_at.as_ref().map(format_ts),
            appt.cancelled_by.map(|a| a.as_str()),
            format_ts(&appt.updated_at),
            appt.id,
        ],
    )?;
    Ok(count > 0)
}

// ── Appointment Events ──

fn parse_event_row(row: &Row) -> rusqlite::Result<AppointmentEvent> {
    let kind: String = row.get(3)?;
    let event_type = EventType::parse(&kind)
        .ok_or_else(|| invalid_text(3, format!("unknown event type: {kind}")))?;
    Ok(AppointmentEvent {
        id: row.get(0)?,
        appointment_id: row.get(1)?,
        business_id: row.get(2)?,
        event_type,
        old_start: opt_ts_at(row, 4)?,
        new_start: opt_ts_at(row, 5)?,
        created_at: ts_at(row, 6)?,
    })
}

pub fn insert_event(
    conn: &Connection,
    appt: &Appointment,
    event_type: EventType,
    old_start: Option<DateTime<Utc>>,
    new_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<AppointmentEvent, AppError> {
    conn.execute(
        "INSERT INTO appointment_events (appointment_id, business_id, event_type, old_start, new_start, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            appt.id,
            appt.business_id,
            event_type.as_str(),
            old_start.as_ref().map(format_ts),
            new_start.as_ref().map(format_ts),
            format_ts(&now),
        ],
    )?;

    // Round-trip through the stored format so the event matches what a replay would read
    let id = conn.last_insert_rowid();
    let event = conn.query_row(
        "SELECT id, appointment_id, business_id, event_type, old_start, new_start, created_at
         FROM appointment_events WHERE id = ?1",
        params![id],
        parse_event_row,
    )?;
    Ok(event)
}

pub fn get_appointment_events(
    conn: &Connection,
    appointment_id: &str,
) -> Result<Vec<AppointmentEvent>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_id, business_id, event_type, old_start, new_start, created_at
         FROM appointment_events WHERE appointment_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![appointment_id], parse_event_row)?;

    let mut events = vec![];
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

pub fn get_events_since(
    conn: &Connection,
    business_id: &str,
    since_id: i64,
) -> Result<Vec<AppointmentEvent>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_id, business_id, event_type, old_start, new_start, created_at
         FROM appointment_events WHERE business_id = ?1 AND id > ?2 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![business_id, since_id], parse_event_row)?;

    let mut events = vec![];
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}
