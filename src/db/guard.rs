//! Conflict guard: the only code that writes appointment rows.
//!
//! Every write runs in a `BEGIN IMMEDIATE` transaction, so writers are serialized at the
//! storage layer, and re-checks the stylist's reserved windows before touching the row.
//! The `appointments_no_overlap_*` triggers enforce the same rule inside SQLite itself.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};

use super::queries;
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentEvent, AppointmentStatus, EventType};

/// Message raised by the overlap triggers in the schema.
const OVERLAP_MESSAGE: &str = "appointment overlap";

fn overlap_to_unavailable(err: AppError) -> AppError {
    match &err {
        AppError::Database(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains(OVERLAP_MESSAGE) => {
            AppError::SlotUnavailable("the stylist is already booked for this time".to_string())
        }
        _ => err,
    }
}

fn ensure_window_free(conn: &Connection, appt: &Appointment) -> Result<(), AppError> {
    let stylist_id = appt
        .stylist_id
        .as_deref()
        .ok_or_else(|| AppError::Invalid("appointment has no stylist assigned".to_string()))?;

    let clashes = queries::get_busy_windows(
        conn,
        stylist_id,
        &appt.reserved_start,
        &appt.reserved_end,
        Some(appt.id.as_str()),
    )?;

    if let Some(clash) = clashes.first() {
        tracing::info!(
            appointment_id = %appt.id,
            stylist_id = %stylist_id,
            conflicting_id = %clash.appointment_id,
            "write rejected by conflict guard"
        );
        return Err(AppError::SlotUnavailable(
            "the stylist is already booked for this time".to_string(),
        ));
    }
    Ok(())
}

fn reload(conn: &Connection, appt: &Appointment) -> Result<Appointment, AppError> {
    queries::get_appointment(conn, &appt.business_id, &appt.id)?
        .ok_or_else(|| AppError::NotFound(format!("appointment {}", appt.id)))
}

/// Inserts a new appointment if its reserved window is still free.
pub fn insert_appointment(
    conn: &mut Connection,
    appt: &Appointment,
    now: DateTime<Utc>,
) -> Result<(Appointment, AppointmentEvent), AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    ensure_window_free(&tx, appt)?;
    queries::insert_appointment(&tx, appt).map_err(overlap_to_unavailable)?;
    let event = queries::insert_event(&tx, appt, EventType::Created, None, Some(appt.start_time), now)?;
    let stored = reload(&tx, appt)?;

    tx.commit()?;
    Ok((stored, event))
}

/// Moves `current` to the times in `moved`, keeping id and history.
pub fn move_appointment(
    conn: &mut Connection,
    current: &Appointment,
    moved: &Appointment,
    now: DateTime<Utc>,
) -> Result<(Appointment, AppointmentEvent), AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let latest = reload(&tx, current)?;
    if !latest.status.is_upcoming() {
        return Err(AppError::NotReschedulable {
            status: latest.status,
        });
    }

    ensure_window_free(&tx, moved)?;
    queries::update_appointment_times(&tx, moved).map_err(overlap_to_unavailable)?;
    let event = queries::insert_event(
        &tx,
        moved,
        EventType::Rescheduled,
        Some(latest.start_time),
        Some(moved.start_time),
        now,
    )?;
    let stored = reload(&tx, moved)?;

    tx.commit()?;
    Ok((stored, event))
}

/// Compare-and-set of the status: applies `updated` only if the row is still `expected`.
/// A row already in the target status is returned unchanged, with no event.
pub fn update_status(
    conn: &mut Connection,
    updated: &Appointment,
    expected: AppointmentStatus,
    event_type: EventType,
    now: DateTime<Utc>,
) -> Result<(Appointment, Option<AppointmentEvent>), AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let latest = reload(&tx, updated)?;
    if latest.status == updated.status {
        return Ok((latest, None));
    }
    if latest.status != expected {
        return Err(AppError::InvalidTransition {
            from: latest.status,
            to: updated.status,
        });
    }

    if updated.status.is_active() {
        ensure_window_free(&tx, updated)?;
    }
    queries::update_appointment_status(&tx, updated).map_err(overlap_to_unavailable)?;
    let event = queries::insert_event(&tx, updated, event_type, None, None, now)?;
    let stored = reload(&tx, updated)?;

    tx.commit()?;
    Ok((stored, Some(event)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{appointment, seeded_conn, utc};

    #[test]
    fn test_insert_records_created_event() {
        let mut conn = seeded_conn();
        let appt = appointment("a1", "ana", "2025-06-16T10:00:00Z", 60);

        let (stored, event) = insert_appointment(&mut conn, &appt, utc("2025-06-09T08:00:00Z")).unwrap();
        assert_eq!(stored.status, AppointmentStatus::Pending);
        assert_eq!(event.event_type, EventType::Created);
        assert_eq!(event.new_start, Some(utc("2025-06-16T10:00:00Z")));
    }

    #[test]
    fn test_overlapping_insert_is_rejected() {
        let mut conn = seeded_conn();
        let now = utc("2025-06-09T08:00:00Z");
        insert_appointment(&mut conn, &appointment("a1", "ana", "2025-06-16T10:00:00Z", 60), now).unwrap();

        let clash = appointment("a2", "ana", "2025-06-16T10:30:00Z", 60);
        let err = insert_appointment(&mut conn, &clash, now).unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
        assert!(queries::get_appointment(&conn, "salon", "a2").unwrap().is_none());

        // Same time, different stylist is fine
        let other = appointment("a3", "bea", "2025-06-16T10:30:00Z", 60);
        assert!(insert_appointment(&mut conn, &other, now).is_ok());

        // Back-to-back is fine
        let adjacent = appointment("a4", "ana", "2025-06-16T11:00:00Z", 60);
        assert!(insert_appointment(&mut conn, &adjacent, now).is_ok());
    }

    #[test]
    fn test_storage_constraint_backs_the_guard() {
        let conn = seeded_conn();
        queries::insert_appointment(&conn, &appointment("a1", "ana", "2025-06-16T10:00:00Z", 60)).unwrap();

        // Bypass the application-level check entirely
        let err = queries::insert_appointment(&conn, &appointment("a2", "ana", "2025-06-16T10:59:00Z", 60))
            .map_err(overlap_to_unavailable)
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
    }

    #[test]
    fn test_cancelled_appointments_release_their_window() {
        let mut conn = seeded_conn();
        let now = utc("2025-06-09T08:00:00Z");
        let (first, _) =
            insert_appointment(&mut conn, &appointment("a1", "ana", "2025-06-16T10:00:00Z", 60), now).unwrap();

        let cancelled = Appointment {
            status: AppointmentStatus::Cancelled,
            cancelled_at: Some(now),
            ..first
        };
        let (_, event) =
            update_status(&mut conn, &cancelled, AppointmentStatus::Pending, EventType::Cancelled, now).unwrap();
        assert!(event.is_some());

        assert!(insert_appointment(&mut conn, &appointment("a2", "ana", "2025-06-16T10:00:00Z", 60), now).is_ok());
    }

    #[test]
    fn test_update_status_is_compare_and_set() {
        let mut conn = seeded_conn();
        let now = utc("2025-06-09T08:00:00Z");
        let (stored, _) =
            insert_appointment(&mut conn, &appointment("a1", "ana", "2025-06-16T10:00:00Z", 60), now).unwrap();

        let started = Appointment {
            status: AppointmentStatus::InProgress,
            ..stored.clone()
        };
        let err = update_status(&mut conn, &started, AppointmentStatus::Confirmed, EventType::Started, now)
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: AppointmentStatus::Pending,
                to: AppointmentStatus::InProgress
            }
        ));

        // Already in the target status: unchanged, no event
        let (same, event) =
            update_status(&mut conn, &stored, AppointmentStatus::Confirmed, EventType::Confirmed, now).unwrap();
        assert_eq!(same.status, AppointmentStatus::Pending);
        assert!(event.is_none());
    }

    #[test]
    fn test_move_excludes_itself_from_the_check() {
        let mut conn = seeded_conn();
        let now = utc("2025-06-09T08:00:00Z");
        let (current, _) =
            insert_appointment(&mut conn, &appointment("a1", "ana", "2025-06-16T10:00:00Z", 60), now).unwrap();

        // Overlaps only its own current window
        let moved = appointment("a1", "ana", "2025-06-16T10:30:00Z", 60);
        let (stored, event) = move_appointment(&mut conn, &current, &moved, now).unwrap();
        assert_eq!(stored.start_time, utc("2025-06-16T10:30:00Z"));
        assert_eq!(stored.end_time, utc("2025-06-16T11:30:00Z"));
        assert_eq!(event.old_start, Some(utc("2025-06-16T10:00:00Z")));
        assert_eq!(event.new_start, Some(utc("2025-06-16T10:30:00Z")));

        let history = queries::get_appointment_events(&conn, "a1").unwrap();
        let kinds: Vec<EventType> = history.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![EventType::Created, EventType::Rescheduled]);
    }

    #[test]
    fn test_move_into_another_appointment_is_rejected() {
        let mut conn = seeded_conn();
        let now = utc("2025-06-09T08:00:00Z");
        let (current, _) =
            insert_appointment(&mut conn, &appointment("a1", "ana", "2025-06-16T10:00:00Z", 60), now).unwrap();
        insert_appointment(&mut conn, &appointment("a2", "ana", "2025-06-16T12:00:00Z", 60), now).unwrap();

        let moved = appointment("a1", "ana", "2025-06-16T11:30:00Z", 60);
        let err = move_appointment(&mut conn, &current, &moved, now).unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));

        let unchanged = queries::get_appointment(&conn, "salon", "a1").unwrap().unwrap();
        assert_eq!(unchanged.start_time, utc("2025-06-16T10:00:00Z"));
    }
}
