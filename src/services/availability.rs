//! Availability engine: turns a frozen schedule snapshot into bookable start times.
//!
//! The result is an optimistic pre-filter. The conflict guard in `db::guard` repeats the
//! overlap check at write time and is the authority; both compare the same reserved
//! windows so a slot offered here is accepted there under unchanged state.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;

use super::booking::{load_business, load_service};
use super::schedule::{self, ScheduleSnapshot, StylistDay, StylistFilter};
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Business, Service, TimeSlot};
use crate::state::AppState;

fn overlaps(a_start: DateTime<Utc>, a_end: DateTime<Utc>, b_start: DateTime<Utc>, b_end: DateTime<Utc>) -> bool {
    a_start < b_end && b_start < a_end
}

fn window_is_free(day: &StylistDay, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    let booked = day.busy.iter().any(|w| overlaps(from, to, w.start, w.end));
    let blocked = day
        .time_off
        .iter()
        .any(|t| overlaps(from, to, t.starts_at, t.ends_at));
    !booked && !blocked
}

/// Every candidate start inside working hours, flagged with whether it can be booked.
/// Past dates produce nothing.
pub fn compute_slot_grid(
    business: &Business,
    service: &Service,
    snapshot: &ScheduleSnapshot,
    now: DateTime<Utc>,
) -> Vec<TimeSlot> {
    if snapshot.date < business.today(now) {
        return vec![];
    }

    let earliest = business.earliest_bookable(now);
    let latest = business.latest_bookable(now);
    let step = business.granularity();

    let mut slots = Vec::new();
    for day in &snapshot.stylists {
        for block in &day.open {
            // Compared as instants so a DST shift inside the block is counted
            let Some(close_at) = business.localize_at_or_after(snapshot.date.and_time(block.close)) else {
                continue;
            };

            let mut minute = block.open_minute();
            while minute < block.close_minute() {
                let local = snapshot
                    .date
                    .and_hms_opt((minute / 60) as u32, (minute % 60) as u32, 0);

                if let Some(start) = local.and_then(|l| business.localize(l)) {
                    let end = service.end_time(start);
                    if end <= close_at {
                        let (reserved_start, reserved_end) = service.reserved_window(start);
                        let available = start >= earliest
                            && start <= latest
                            && window_is_free(day, reserved_start, reserved_end);

                        slots.push(TimeSlot {
                            stylist_id: day.stylist.id.clone(),
                            stylist_name: day.stylist.name.clone(),
                            start_time: start,
                            end_time: end,
                            time: format!("{:02}:{:02}", minute / 60, minute % 60),
                            available,
                        });
                    }
                }

                minute += step;
            }
        }
    }

    // Stable: stylists sharing a start time keep their listing order
    slots.sort_by_key(|s| s.start_time);
    slots
}

/// Bookable slots only, ascending by start time. Ties across stylists are all kept.
pub fn compute_slots(
    business: &Business,
    service: &Service,
    snapshot: &ScheduleSnapshot,
    now: DateTime<Utc>,
) -> Vec<TimeSlot> {
    compute_slot_grid(business, service, snapshot, now)
        .into_iter()
        .filter(|s| s.available)
        .collect()
}

/// Loads a snapshot for the date and computes its slots.
#[allow(clippy::too_many_arguments)]
pub fn slots_for(
    conn: &Connection,
    business: &Business,
    service: &Service,
    date: NaiveDate,
    filter: &StylistFilter,
    exclude_appointment_id: Option<&str>,
    now: DateTime<Utc>,
    include_unavailable: bool,
) -> Result<Vec<TimeSlot>, AppError> {
    let snapshot = schedule::load_snapshot(conn, business, service, date, filter, exclude_appointment_id)?;
    if include_unavailable {
        Ok(compute_slot_grid(business, service, &snapshot, now))
    } else {
        Ok(compute_slots(business, service, &snapshot, now))
    }
}

#[derive(Debug, Clone)]
pub struct AvailabilityQuery {
    pub service_id: String,
    pub date: NaiveDate,
    pub stylist: StylistFilter,
    /// An appointment being rescheduled; its own window does not count as busy.
    pub exclude_appointment_id: Option<String>,
    pub include_unavailable: bool,
}

pub async fn available_slots(
    state: &AppState,
    business_id: &str,
    query: &AvailabilityQuery,
) -> Result<Vec<TimeSlot>, AppError> {
    let now = state.clock.now();
    let conn = state.store().await?;
    let business = load_business(&conn, business_id)?;
    let service = load_service(&conn, &business.id, &query.service_id)?;

    if let Some(id) = &query.exclude_appointment_id {
        if queries::get_appointment(&conn, &business.id, id)?.is_none() {
            return Err(AppError::NotFound(format!("appointment {id}")));
        }
    }

    let slots = slots_for(
        &conn,
        &business,
        &service,
        query.date,
        &query.stylist,
        query.exclude_appointment_id.as_deref(),
        now,
        query.include_unavailable,
    )?;
    tracing::debug!(
        business_id = %business.id,
        service_id = %service.id,
        date = %query.date,
        count = slots.len(),
        "computed availability"
    );
    Ok(slots)
}

/// The slot a booking at `start` would take: the earliest-listed stylist offering it.
pub fn pick_slot(slots: &[TimeSlot], start: DateTime<Utc>) -> Option<&TimeSlot> {
    slots.iter().find(|s| s.available && s.start_time == start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::queries::BusyWindow;
    use crate::models::business::parse_timezone;
    use crate::models::hours::parse_time;
    use crate::models::{DepositPolicy, OpenInterval, Stylist, TimeOff, WeeklyHours};
    use chrono::Duration;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn business(tz: &str, min_notice_hours: i64) -> Business {
        Business {
            id: "biz".to_string(),
            name: "Salon".to_string(),
            timezone: parse_timezone(tz).unwrap(),
            min_notice_hours,
            max_advance_days: 60,
            cancellation_window_hours: 24,
            slot_granularity_minutes: 15,
            business_hours: WeeklyHours::default(),
        }
    }

    fn service(duration: i64, before: i64, after: i64) -> Service {
        Service {
            id: "svc".to_string(),
            business_id: "biz".to_string(),
            name: "Cut".to_string(),
            duration_minutes: duration,
            buffer_before_minutes: before,
            buffer_after_minutes: after,
            deposit: DepositPolicy {
                required: false,
                amount_cents: 0,
            },
            base_price_cents: 4500,
        }
    }

    fn day(id: &str, open: &str, close: &str) -> StylistDay {
        StylistDay {
            stylist: Stylist {
                id: id.to_string(),
                business_id: "biz".to_string(),
                name: id.to_uppercase(),
                is_active: true,
                weekly_hours: WeeklyHours::default(),
            },
            open: OpenInterval::new(parse_time(open).unwrap(), parse_time(close).unwrap())
                .into_iter()
                .collect(),
            time_off: vec![],
            busy: vec![],
        }
    }

    fn busy(id: &str, start: &str, end: &str) -> BusyWindow {
        BusyWindow {
            appointment_id: id.to_string(),
            start: utc(start),
            end: utc(end),
        }
    }

    fn snapshot(stylists: Vec<StylistDay>) -> ScheduleSnapshot {
        ScheduleSnapshot {
            date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
            stylists,
        }
    }

    fn times(slots: &[TimeSlot]) -> Vec<String> {
        slots.iter().map(|s| s.time.clone()).collect()
    }

    // A week before the test date, so lead time never interferes unless intended
    fn early_now() -> DateTime<Utc> {
        utc("2025-06-09T08:00:00Z")
    }

    #[test]
    fn test_existing_appointment_excludes_overlapping_starts() {
        let mut stylist = day("s1", "09:00", "17:00");
        stylist.busy.push(busy("a1", "2025-06-16T10:00:00Z", "2025-06-16T11:00:00Z"));

        let slots = compute_slots(&business("UTC", 0), &service(60, 0, 0), &snapshot(vec![stylist]), early_now());
        let t = times(&slots);

        assert_eq!(t.first().map(String::as_str), Some("09:00"));
        for excluded in ["09:15", "09:30", "09:45", "10:00", "10:15", "10:30", "10:45"] {
            assert!(!t.contains(&excluded.to_string()), "{excluded} should be excluded");
        }
        assert!(t.contains(&"11:00".to_string()));
        // Last start that still ends by closing time
        assert_eq!(t.last().map(String::as_str), Some("16:00"));
    }

    #[test]
    fn test_buffers_widen_the_conflict_window() {
        let mut stylist = day("s1", "09:00", "17:00");
        stylist.busy.push(busy("a1", "2025-06-16T12:00:00Z", "2025-06-16T13:00:00Z"));

        let slots = compute_slots(&business("UTC", 0), &service(30, 15, 15), &snapshot(vec![stylist]), early_now());
        let t = times(&slots);

        // 11:15 reserves [11:00, 12:00): fine. 11:30 reserves [11:15, 12:15): clashes.
        assert!(t.contains(&"11:15".to_string()));
        assert!(!t.contains(&"11:30".to_string()));
        // 13:00 reserves [12:45, 13:45): clashes. 13:15 reserves [13:00, 14:00): fine.
        assert!(!t.contains(&"13:00".to_string()));
        assert!(t.contains(&"13:15".to_string()));
    }

    #[test]
    fn test_lead_time_boundaries() {
        let stylist = day("s1", "09:00", "17:00");
        // Exactly 24h ahead is still bookable
        let now = utc("2025-06-15T09:00:00Z");
        let slots = compute_slots(&business("UTC", 24), &service(30, 0, 0), &snapshot(vec![stylist]), now);
        let t = times(&slots);
        assert_eq!(t.first().map(String::as_str), Some("09:00"));

        let now = utc("2025-06-15T10:00:00Z");
        let slots = compute_slots(
            &business("UTC", 24),
            &service(30, 0, 0),
            &snapshot(vec![day("s1", "09:00", "17:00")]),
            now,
        );
        let t = times(&slots);
        // 09:00 is 23h away, 11:00 is 25h away
        assert!(!t.contains(&"09:00".to_string()));
        assert!(t.contains(&"11:00".to_string()));
    }

    #[test]
    fn test_max_advance_days() {
        let stylist = day("s1", "09:00", "17:00");
        let mut b = business("UTC", 0);
        b.max_advance_days = 3;
        let slots = compute_slots(&b, &service(30, 0, 0), &snapshot(vec![stylist]), early_now());
        assert!(slots.is_empty());
    }

    #[test]
    fn test_service_longer_than_open_window_yields_nothing() {
        let stylist = day("s1", "09:00", "10:00");
        let slots = compute_slots(&business("UTC", 0), &service(90, 0, 0), &snapshot(vec![stylist]), early_now());
        assert!(slots.is_empty());
    }

    #[test]
    fn test_closed_stylist_contributes_nothing() {
        let mut stylist = day("s1", "09:00", "17:00");
        stylist.open.clear();
        let slots = compute_slots(&business("UTC", 0), &service(30, 0, 0), &snapshot(vec![stylist]), early_now());
        assert!(slots.is_empty());
    }

    #[test]
    fn test_split_shift_offers_both_blocks() {
        let mut stylist = day("s1", "09:00", "10:00");
        stylist.open.push(OpenInterval::new(parse_time("13:00").unwrap(), parse_time("14:00").unwrap()).unwrap());

        let slots = compute_slots(&business("UTC", 0), &service(60, 0, 0), &snapshot(vec![stylist]), early_now());
        assert_eq!(times(&slots), vec!["09:00", "13:00"]);
    }

    #[test]
    fn test_service_must_end_by_close_across_spring_forward() {
        // 2025-03-09: New York clocks jump from 02:00 to 03:00
        let stylist = day("s1", "01:00", "03:30");
        let dst_day = ScheduleSnapshot {
            date: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
            stylists: vec![stylist],
        };
        let now = utc("2025-03-02T12:00:00Z");

        let slots = compute_slots(&business("America/New_York", 0), &service(60, 0, 0), &dst_day, now);
        // 01:45 EST plus an hour is 03:45 EDT, past closing
        assert_eq!(times(&slots), vec!["01:00", "01:15", "01:30"]);
        assert!(slots.iter().all(|s| s.end_time <= utc("2025-03-09T07:30:00Z")));
    }

    #[test]
    fn test_past_date_is_empty_not_error() {
        let stylist = day("s1", "09:00", "17:00");
        let now = utc("2025-06-17T08:00:00Z");
        let grid = compute_slot_grid(&business("UTC", 0), &service(30, 0, 0), &snapshot(vec![stylist]), now);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_time_off_blocks_slots() {
        let mut stylist = day("s1", "09:00", "12:00");
        stylist.time_off.push(TimeOff {
            stylist_id: "s1".to_string(),
            starts_at: utc("2025-06-16T09:00:00Z"),
            ends_at: utc("2025-06-16T11:00:00Z"),
            reason: Some("dentist".to_string()),
        });
        let slots = compute_slots(&business("UTC", 0), &service(60, 0, 0), &snapshot(vec![stylist]), early_now());
        assert_eq!(times(&slots), vec!["11:00"]);
    }

    #[test]
    fn test_any_mode_keeps_ties_in_listing_order() {
        let mut bea = day("bea", "09:00", "10:00");
        bea.busy.push(busy("a1", "2025-06-16T09:00:00Z", "2025-06-16T09:30:00Z"));
        let ana = day("ana", "09:00", "10:00");

        let slots = compute_slots(&business("UTC", 0), &service(30, 0, 0), &snapshot(vec![ana, bea]), early_now());
        let listed: Vec<(String, String)> = slots
            .iter()
            .map(|s| (s.time.clone(), s.stylist_id.clone()))
            .collect();

        assert_eq!(
            listed,
            vec![
                ("09:00".to_string(), "ana".to_string()),
                ("09:15".to_string(), "ana".to_string()),
                ("09:30".to_string(), "ana".to_string()),
                ("09:30".to_string(), "bea".to_string()),
            ]
        );

        let picked = pick_slot(&slots, utc("2025-06-16T09:30:00Z")).unwrap();
        assert_eq!(picked.stylist_id, "ana");
    }

    #[test]
    fn test_grid_flags_unavailable_slots() {
        let mut stylist = day("s1", "09:00", "10:00");
        stylist.busy.push(busy("a1", "2025-06-16T09:00:00Z", "2025-06-16T09:30:00Z"));
        let grid = compute_slot_grid(&business("UTC", 0), &service(30, 0, 0), &snapshot(vec![stylist]), early_now());

        let flags: Vec<bool> = grid.iter().map(|s| s.available).collect();
        assert_eq!(flags, vec![false, false, true]);
    }

    #[test]
    fn test_local_hours_follow_business_timezone() {
        let stylist = day("s1", "09:00", "10:00");
        let slots = compute_slots(
            &business("America/New_York", 0),
            &service(60, 0, 0),
            &snapshot(vec![stylist]),
            early_now(),
        );
        assert_eq!(slots.len(), 1);
        // 09:00 EDT
        assert_eq!(slots[0].start_time, utc("2025-06-16T13:00:00Z"));
        assert_eq!(slots[0].end_time - slots[0].start_time, Duration::minutes(60));
    }
}
