//! Fixtures shared by unit tests.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::db;
use crate::models::{Appointment, AppointmentStatus};

pub const SALON_SEED: &str = include_str!("../tests/fixtures/salon.json");

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// In-memory store with the salon fixture loaded.
pub fn seeded_conn() -> Connection {
    let mut conn = db::init_db(":memory:").unwrap();
    db::seed::load_seed_str(&mut conn, SALON_SEED).unwrap();
    conn
}

/// A pending "cut" at the salon with no buffers.
pub fn appointment(id: &str, stylist: &str, start: &str, minutes: i64) -> Appointment {
    let start = utc(start);
    let end = start + Duration::minutes(minutes);
    Appointment {
        id: id.to_string(),
        business_id: "salon".to_string(),
        stylist_id: Some(stylist.to_string()),
        client_id: Some("client-1".to_string()),
        walk_in_name: None,
        service_id: "cut".to_string(),
        start_time: start,
        end_time: end,
        reserved_start: start,
        reserved_end: end,
        status: AppointmentStatus::Pending,
        quoted_price_cents: 4500,
        notes: None,
        payment_reference: None,
        cancelled_at: None,
        cancelled_by: None,
        created_at: utc("2025-06-01T00:00:00Z"),
        updated_at: utc("2025-06-01T00:00:00Z"),
    }
}
