use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use super::WeeklyHours;

pub const DEFAULT_TIMEZONE: &str = "America/Chicago";
pub const DEFAULT_MIN_NOTICE_HOURS: i64 = 2;
pub const DEFAULT_MAX_ADVANCE_DAYS: i64 = 60;
pub const DEFAULT_CANCELLATION_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_SLOT_GRANULARITY_MINUTES: i64 = 15;

/// A tenant and its booking policy. Loaded once per operation and never mutated by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct Business {
    pub id: String,
    pub name: String,
    pub timezone: Tz,
    pub min_notice_hours: i64,
    pub max_advance_days: i64,
    pub cancellation_window_hours: i64,
    pub slot_granularity_minutes: i64,
    pub business_hours: WeeklyHours,
}

impl Business {
    /// The calendar date "now" falls on in the business's own time zone.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    pub fn local_date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    /// Resolves a local wall-clock time to an instant. Times skipped by a DST
    /// transition have no instant and yield `None`; ambiguous times take the earlier one.
    pub fn localize(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Like `localize`, but a wall time skipped by a DST transition resolves to the
    /// first instant after the gap.
    pub fn localize_at_or_after(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        (0..=180).find_map(|minutes| self.localize(local + Duration::minutes(minutes)))
    }

    pub fn earliest_bookable(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::hours(self.min_notice_hours)
    }

    pub fn latest_bookable(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(self.max_advance_days)
    }

    pub fn cancellation_window(&self) -> Duration {
        Duration::hours(self.cancellation_window_hours)
    }

    pub fn granularity(&self) -> i64 {
        if self.slot_granularity_minutes > 0 {
            self.slot_granularity_minutes
        } else {
            DEFAULT_SLOT_GRANULARITY_MINUTES
        }
    }
}

pub fn parse_timezone(s: &str) -> Option<Tz> {
    s.parse::<Tz>().ok()
}
