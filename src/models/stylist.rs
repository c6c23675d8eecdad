use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::{OpenInterval, WeeklyHours};

#[derive(Debug, Clone, Serialize)]
pub struct Stylist {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub is_active: bool,
    pub weekly_hours: WeeklyHours,
}

/// Replaces the weekly entry for one specific date. `hours: None` means the stylist is off.
#[derive(Debug, Clone)]
pub struct DateOverride {
    pub stylist_id: String,
    pub date: NaiveDate,
    pub hours: Option<OpenInterval>,
}

/// An absolute blocked range, e.g. a vacation or a doctor's appointment.
#[derive(Debug, Clone)]
pub struct TimeOff {
    pub stylist_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: Option<String>,
}
