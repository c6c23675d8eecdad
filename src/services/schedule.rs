use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Connection;

use crate::db::queries::{self, BusyWindow};
use crate::errors::AppError;
use crate::models::{Business, OpenInterval, Service, Stylist, TimeOff};

/// Which stylists an availability query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StylistFilter {
    Any,
    One(String),
}

impl StylistFilter {
    /// `None`, an empty string and `"any"` all mean any available stylist.
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(str::trim) {
            None | Some("") => StylistFilter::Any,
            Some(s) if s.eq_ignore_ascii_case("any") => StylistFilter::Any,
            Some(s) => StylistFilter::One(s.to_string()),
        }
    }
}

/// One stylist's frozen view of a single date.
#[derive(Debug, Clone)]
pub struct StylistDay {
    pub stylist: Stylist,
    /// Effective local open blocks in order; empty when the stylist does not work that day.
    pub open: Vec<OpenInterval>,
    pub time_off: Vec<TimeOff>,
    pub busy: Vec<BusyWindow>,
}

/// Everything an availability computation reads, captured once per request.
#[derive(Debug, Clone)]
pub struct ScheduleSnapshot {
    pub date: NaiveDate,
    pub stylists: Vec<StylistDay>,
}

/// Date override first, weekly hours otherwise, then clipped to the business's hours.
/// Any missing level means closed. Split shifts at either level stay split.
pub fn effective_open_intervals(
    business: &Business,
    stylist: &Stylist,
    date: NaiveDate,
    override_hours: Option<Option<OpenInterval>>,
) -> Vec<OpenInterval> {
    use chrono::Datelike;

    let stylist_hours = match override_hours {
        Some(hours) => hours.into_iter().collect(),
        None => stylist.weekly_hours.hours_for(date.weekday()),
    };
    let business_hours = business.business_hours.hours_for(date.weekday());

    let mut open: Vec<OpenInterval> = stylist_hours
        .iter()
        .flat_map(|s| business_hours.iter().filter_map(move |b| s.intersect(b)))
        .collect();
    open.sort_by_key(|o| o.open);
    open
}

/// Resolves the candidate stylists for a query. An unknown stylist id is an error;
/// an inactive or unqualified one simply contributes nothing.
pub fn resolve_stylists(
    conn: &Connection,
    business: &Business,
    service: &Service,
    filter: &StylistFilter,
) -> Result<Vec<Stylist>, AppError> {
    match filter {
        StylistFilter::Any => queries::list_qualified_stylists(conn, &business.id, &service.id),
        StylistFilter::One(id) => {
            let stylist = queries::get_stylist(conn, &business.id, id)?
                .ok_or_else(|| AppError::NotFound(format!("stylist {id}")))?;
            if stylist.is_active && queries::is_qualified(conn, &stylist.id, &service.id)? {
                Ok(vec![stylist])
            } else {
                Ok(vec![])
            }
        }
    }
}

pub fn load_snapshot(
    conn: &Connection,
    business: &Business,
    service: &Service,
    date: NaiveDate,
    filter: &StylistFilter,
    exclude_appointment_id: Option<&str>,
) -> Result<ScheduleSnapshot, AppError> {
    let stylists = resolve_stylists(conn, business, service, filter)?;
    let before = Duration::minutes(service.buffer_before_minutes);
    let after = Duration::minutes(service.buffer_after_minutes);

    let mut days = Vec::with_capacity(stylists.len());
    for stylist in stylists {
        let override_hours = queries::get_date_override(conn, &stylist.id, date)?.map(|o| o.hours);
        let open = effective_open_intervals(business, &stylist, date, override_hours);
        let span = match (open.first(), open.last()) {
            (Some(first), Some(last)) => OpenInterval::new(first.open, last.close),
            _ => None,
        };

        let (time_off, busy) = match span.and_then(|s| utc_bounds(business, date, &s)) {
            Some((open_at, close_at)) => {
                let from = open_at - before;
                let to = close_at + after;
                (
                    queries::get_time_off_overlapping(conn, &stylist.id, &from, &to)?,
                    queries::get_busy_windows(conn, &stylist.id, &from, &to, exclude_appointment_id)?,
                )
            }
            None => (vec![], vec![]),
        };

        days.push(StylistDay {
            stylist,
            open,
            time_off,
            busy,
        });
    }

    Ok(ScheduleSnapshot {
        date,
        stylists: days,
    })
}

/// The instants bounding an open interval on a date. Endpoints that fall into a DST
/// gap are widened by an hour so that fetched data still covers the whole window.
fn utc_bounds(
    business: &Business,
    date: NaiveDate,
    open: &OpenInterval,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = business
        .localize(date.and_time(open.open))
        .or_else(|| business.localize(date.and_time(open.open) - Duration::hours(1)))?;
    let end = business
        .localize(date.and_time(open.close))
        .or_else(|| business.localize(date.and_time(open.close) + Duration::hours(1)))?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::business::parse_timezone;
    use crate::models::hours::parse_time;
    use crate::models::WeeklyHours;

    fn business() -> Business {
        Business {
            id: "biz".to_string(),
            name: "Salon".to_string(),
            timezone: parse_timezone("UTC").unwrap(),
            min_notice_hours: 0,
            max_advance_days: 60,
            cancellation_window_hours: 24,
            slot_granularity_minutes: 15,
            business_hours: WeeklyHours::from_json(
                r#"{"days":[{"day":"mon","open":"09:00","close":"17:00"},{"day":"tue","open":"09:00","close":"17:00"}]}"#,
            )
            .unwrap(),
        }
    }

    fn stylist(hours: &str) -> Stylist {
        Stylist {
            id: "sty".to_string(),
            business_id: "biz".to_string(),
            name: "Sam".to_string(),
            is_active: true,
            weekly_hours: WeeklyHours::from_json(hours).unwrap(),
        }
    }

    fn interval(open: &str, close: &str) -> OpenInterval {
        OpenInterval::new(parse_time(open).unwrap(), parse_time(close).unwrap()).unwrap()
    }

    // 2025-06-16 is a Monday
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
    }

    #[test]
    fn test_weekly_hours_clipped_to_business_hours() {
        let s = stylist(r#"{"days":[{"day":"mon","open":"08:00","close":"12:00"}]}"#);
        let open = effective_open_intervals(&business(), &s, monday(), None);
        assert_eq!(open, vec![interval("09:00", "12:00")]);
    }

    #[test]
    fn test_override_replaces_weekly_hours() {
        let s = stylist(r#"{"days":[{"day":"mon","open":"09:00","close":"12:00"}]}"#);
        let extended = Some(Some(interval("13:00", "17:00")));
        assert_eq!(
            effective_open_intervals(&business(), &s, monday(), extended),
            vec![interval("13:00", "17:00")]
        );

        let day_off = Some(None);
        assert!(effective_open_intervals(&business(), &s, monday(), day_off).is_empty());
    }

    #[test]
    fn test_missing_entries_mean_closed() {
        // Stylist has no Tuesday entry even though the business is open
        let s = stylist(r#"{"days":[{"day":"mon","open":"09:00","close":"17:00"}]}"#);
        let tuesday = NaiveDate::from_ymd_opt(2025, 6, 17).unwrap();
        assert!(effective_open_intervals(&business(), &s, tuesday, None).is_empty());

        // Business closed on Wednesday even though the stylist lists hours
        let s = stylist(r#"{"days":[{"day":"wed","open":"09:00","close":"17:00"}]}"#);
        let wednesday = NaiveDate::from_ymd_opt(2025, 6, 18).unwrap();
        assert!(effective_open_intervals(&business(), &s, wednesday, None).is_empty());
    }

    #[test]
    fn test_split_shift_survives_business_clipping() {
        let s = stylist(
            r#"{"days":[{"day":"mon","open":"13:00","close":"18:00"},{"day":"mon","open":"08:00","close":"12:00"}]}"#,
        );
        assert_eq!(
            effective_open_intervals(&business(), &s, monday(), None),
            vec![interval("09:00", "12:00"), interval("13:00", "17:00")]
        );

        // A lunch break in the business's own hours splits a continuous stylist day
        let mut b = business();
        b.business_hours = WeeklyHours::from_json(
            r#"{"days":[{"day":"mon","open":"09:00","close":"12:30"},{"day":"mon","open":"13:30","close":"17:00"}]}"#,
        )
        .unwrap();
        let s = stylist(r#"{"days":[{"day":"mon","open":"10:00","close":"16:00"}]}"#);
        assert_eq!(
            effective_open_intervals(&b, &s, monday(), None),
            vec![interval("10:00", "12:30"), interval("13:30", "16:00")]
        );
    }

    #[test]
    fn test_stylist_filter_from_param() {
        assert_eq!(StylistFilter::from_param(None), StylistFilter::Any);
        assert_eq!(StylistFilter::from_param(Some(" ")), StylistFilter::Any);
        assert_eq!(StylistFilter::from_param(Some("ANY")), StylistFilter::Any);
        assert_eq!(
            StylistFilter::from_param(Some("sty-1")),
            StylistFilter::One("sty-1".to_string())
        );
    }
}
