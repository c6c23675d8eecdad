use chrono::{DateTime, Utc};
use serde::Serialize;

/// A candidate start time for one stylist. Derived per request, never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimeSlot {
    pub stylist_id: String,
    pub stylist_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Local wall-clock start in the business time zone, `HH:MM`.
    pub time: String,
    pub available: bool,
}
