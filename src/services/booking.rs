//! Appointment lifecycle: create, reschedule, cancel and the staff-driven transitions.
//!
//! Each mutation re-runs the availability computation against current state, then hands
//! the write to `db::guard`, which repeats the overlap check inside the transaction.
//! Committed events are published after the store is released.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::availability;
use super::notify;
use super::schedule::StylistFilter;
use crate::db::{guard, queries};
use crate::errors::AppError;
use crate::models::{
    Appointment, AppointmentEvent, AppointmentStatus, Business, CancelActor, ClientRef, EventType,
    Service,
};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub service_id: String,
    pub stylist: StylistFilter,
    pub start_time: DateTime<Utc>,
    pub client: ClientRef,
    pub notes: Option<String>,
}

pub(crate) fn load_business(conn: &Connection, business_id: &str) -> Result<Business, AppError> {
    queries::get_business(conn, business_id)?
        .ok_or_else(|| AppError::NotFound(format!("business {business_id}")))
}

pub(crate) fn load_service(
    conn: &Connection,
    business_id: &str,
    service_id: &str,
) -> Result<Service, AppError> {
    queries::get_service(conn, business_id, service_id)?
        .ok_or_else(|| AppError::NotFound(format!("service {service_id}")))
}

fn load_appointment(conn: &Connection, business_id: &str, id: &str) -> Result<Appointment, AppError> {
    queries::get_appointment(conn, business_id, id)?
        .ok_or_else(|| AppError::NotFound(format!("appointment {id}")))
}

/// Runs a guarded write, retrying once if SQLite reports the database busy or locked.
fn with_transient_retry<T>(
    operation: &str,
    mut write: impl FnMut() -> Result<T, AppError>,
) -> Result<T, AppError> {
    match write() {
        Err(e) if e.is_transient() => {
            tracing::warn!(operation, error = %e, "transient storage failure, retrying once");
            write()
        }
        result => result,
    }
}

fn announce(state: &AppState, event: AppointmentEvent) {
    tracing::info!(
        appointment_id = %event.appointment_id,
        business_id = %event.business_id,
        event_type = event.event_type.as_str(),
        "appointment event recorded"
    );
    notify::publish(state, event);
}

pub async fn create_appointment(
    state: &AppState,
    business_id: &str,
    request: NewAppointment,
) -> Result<Appointment, AppError> {
    let (client_id, walk_in_name) = match request.client {
        ClientRef::Registered(id) if !id.trim().is_empty() => (Some(id.trim().to_string()), None),
        ClientRef::WalkIn(name) if !name.trim().is_empty() => (None, Some(name.trim().to_string())),
        _ => {
            return Err(AppError::Invalid(
                "a client id or walk-in name is required".to_string(),
            ))
        }
    };

    let now = state.clock.now();
    let mut conn = state.store().await?;
    let business = load_business(&conn, business_id)?;
    let service = load_service(&conn, &business.id, &request.service_id)?;

    let date = business.local_date_of(request.start_time);
    let slots = availability::slots_for(
        &conn,
        &business,
        &service,
        date,
        &request.stylist,
        None,
        now,
        false,
    )?;
    let slot = availability::pick_slot(&slots, request.start_time).ok_or_else(|| {
        AppError::SlotUnavailable(format!(
            "{} is not an open slot for {}",
            request.start_time.to_rfc3339(),
            service.name
        ))
    })?;

    let (reserved_start, reserved_end) = service.reserved_window(request.start_time);
    let appt = Appointment {
        id: Uuid::new_v4().to_string(),
        business_id: business.id.clone(),
        stylist_id: Some(slot.stylist_id.clone()),
        client_id,
        walk_in_name,
        service_id: service.id.clone(),
        start_time: request.start_time,
        end_time: service.end_time(request.start_time),
        reserved_start,
        reserved_end,
        status: AppointmentStatus::Pending,
        quoted_price_cents: service.base_price_cents,
        notes: request.notes.filter(|n| !n.trim().is_empty()),
        payment_reference: None,
        cancelled_at: None,
        cancelled_by: None,
        created_at: now,
        updated_at: now,
    };

    let (stored, event) = with_transient_retry("create", || guard::insert_appointment(&mut conn, &appt, now))
        .inspect_err(|e| {
            if matches!(e, AppError::SlotUnavailable(_)) {
                tracing::info!(stylist_id = %slot.stylist_id, start = %appt.start_time, "lost booking race");
            }
        })?;
    drop(conn);

    announce(state, event);
    Ok(stored)
}

/// Moves an upcoming appointment to a new start with the same stylist.
pub async fn reschedule_appointment(
    state: &AppState,
    business_id: &str,
    appointment_id: &str,
    new_start: DateTime<Utc>,
) -> Result<Appointment, AppError> {
    let now = state.clock.now();
    let mut conn = state.store().await?;
    let business = load_business(&conn, business_id)?;
    let current = load_appointment(&conn, &business.id, appointment_id)?;

    if !current.status.is_upcoming() || current.start_time <= now {
        return Err(AppError::NotReschedulable {
            status: current.status,
        });
    }
    let stylist_id = current
        .stylist_id
        .clone()
        .ok_or_else(|| AppError::Invalid("appointment has no stylist assigned".to_string()))?;
    let service = load_service(&conn, &business.id, &current.service_id)?;

    let slots = availability::slots_for(
        &conn,
        &business,
        &service,
        business.local_date_of(new_start),
        &StylistFilter::One(stylist_id),
        Some(current.id.as_str()),
        now,
        false,
    )?;
    if availability::pick_slot(&slots, new_start).is_none() {
        return Err(AppError::SlotUnavailable(format!(
            "{} is not an open slot for this appointment",
            new_start.to_rfc3339()
        )));
    }

    let (reserved_start, reserved_end) = service.reserved_window(new_start);
    let moved = Appointment {
        start_time: new_start,
        end_time: service.end_time(new_start),
        reserved_start,
        reserved_end,
        updated_at: now,
        ..current.clone()
    };

    let (stored, event) =
        with_transient_retry("reschedule", || guard::move_appointment(&mut conn, &current, &moved, now))?;
    drop(conn);

    announce(state, event);
    Ok(stored)
}

/// Cancels a pending or confirmed appointment. Cancelling twice is not an error.
pub async fn cancel_appointment(
    state: &AppState,
    business_id: &str,
    appointment_id: &str,
    actor: CancelActor,
) -> Result<Appointment, AppError> {
    let now = state.clock.now();
    let mut conn = state.store().await?;
    let business = load_business(&conn, business_id)?;
    let current = load_appointment(&conn, &business.id, appointment_id)?;

    if current.status == AppointmentStatus::Cancelled {
        return Ok(current);
    }
    if !current.status.is_upcoming() {
        return Err(AppError::NotCancellable {
            status: current.status,
            reason: format!("appointment is {}", current.status),
        });
    }
    if current.start_time <= now {
        return Err(AppError::NotCancellable {
            status: current.status,
            reason: "appointment has already started".to_string(),
        });
    }
    if actor == CancelActor::Client && current.start_time - now < business.cancellation_window() {
        return Err(AppError::NotCancellable {
            status: current.status,
            reason: format!(
                "cancellations must be made at least {} hours in advance",
                business.cancellation_window_hours
            ),
        });
    }

    let cancelled = Appointment {
        status: AppointmentStatus::Cancelled,
        cancelled_at: Some(now),
        cancelled_by: Some(actor),
        updated_at: now,
        ..current.clone()
    };
    let (stored, event) =
        guard::update_status(&mut conn, &cancelled, current.status, EventType::Cancelled, now).map_err(|e| {
            match e {
                AppError::InvalidTransition { from, .. } => AppError::NotCancellable {
                    status: from,
                    reason: format!("appointment is {from}"),
                },
                other => other,
            }
        })?;
    drop(conn);

    if let Some(event) = event {
        announce(state, event);
    }
    Ok(stored)
}

/// Shared path for staff transitions. `plan` returns the updated row, or `None` when the
/// appointment is already where the caller wants it.
async fn transition<F>(
    state: &AppState,
    business_id: &str,
    appointment_id: &str,
    event_type: EventType,
    plan: F,
) -> Result<Appointment, AppError>
where
    F: FnOnce(&Connection, &Appointment, DateTime<Utc>) -> Result<Option<Appointment>, AppError>,
{
    let now = state.clock.now();
    let mut conn = state.store().await?;
    let business = load_business(&conn, business_id)?;
    let current = load_appointment(&conn, &business.id, appointment_id)?;

    let Some(updated) = plan(&*conn, &current, now)? else {
        return Ok(current);
    };
    let (stored, event) = guard::update_status(&mut conn, &updated, current.status, event_type, now)?;
    drop(conn);

    if let Some(event) = event {
        announce(state, event);
    }
    Ok(stored)
}

/// pending → confirmed. Services that take a deposit need a payment reference.
pub async fn confirm_appointment(
    state: &AppState,
    business_id: &str,
    appointment_id: &str,
    payment_reference: Option<String>,
) -> Result<Appointment, AppError> {
    transition(state, business_id, appointment_id, EventType::Confirmed, |conn, appt, now| {
        match appt.status {
            AppointmentStatus::Confirmed => Ok(None),
            AppointmentStatus::Pending => {
                let service = load_service(conn, &appt.business_id, &appt.service_id)?;
                let payment_reference = payment_reference
                    .filter(|r| !r.trim().is_empty())
                    .or_else(|| appt.payment_reference.clone());
                if service.deposit.required && payment_reference.is_none() {
                    return Err(AppError::DepositRequired);
                }
                Ok(Some(Appointment {
                    status: AppointmentStatus::Confirmed,
                    payment_reference,
                    updated_at: now,
                    ..appt.clone()
                }))
            }
            from => Err(AppError::InvalidTransition {
                from,
                to: AppointmentStatus::Confirmed,
            }),
        }
    })
    .await
}

fn simple_step(
    appt: &Appointment,
    from: AppointmentStatus,
    to: AppointmentStatus,
    now: DateTime<Utc>,
) -> Result<Option<Appointment>, AppError> {
    if appt.status != from {
        return Err(AppError::InvalidTransition {
            from: appt.status,
            to,
        });
    }
    Ok(Some(Appointment {
        status: to,
        updated_at: now,
        ..appt.clone()
    }))
}

/// confirmed → in_progress
pub async fn start_appointment(
    state: &AppState,
    business_id: &str,
    appointment_id: &str,
) -> Result<Appointment, AppError> {
    transition(state, business_id, appointment_id, EventType::Started, |_, appt, now| {
        simple_step(appt, AppointmentStatus::Confirmed, AppointmentStatus::InProgress, now)
    })
    .await
}

/// in_progress → completed
pub async fn complete_appointment(
    state: &AppState,
    business_id: &str,
    appointment_id: &str,
) -> Result<Appointment, AppError> {
    transition(state, business_id, appointment_id, EventType::Completed, |_, appt, now| {
        simple_step(appt, AppointmentStatus::InProgress, AppointmentStatus::Completed, now)
    })
    .await
}

/// pending/confirmed → no_show, once the start time has passed.
pub async fn mark_no_show(
    state: &AppState,
    business_id: &str,
    appointment_id: &str,
) -> Result<Appointment, AppError> {
    transition(state, business_id, appointment_id, EventType::NoShow, |_, appt, now| {
        if !appt.status.is_upcoming() || appt.start_time > now {
            return Err(AppError::InvalidTransition {
                from: appt.status,
                to: AppointmentStatus::NoShow,
            });
        }
        Ok(Some(Appointment {
            status: AppointmentStatus::NoShow,
            updated_at: now,
            ..appt.clone()
        }))
    })
    .await
}

pub async fn get_appointment(
    state: &AppState,
    business_id: &str,
    appointment_id: &str,
) -> Result<Appointment, AppError> {
    let conn = state.store().await?;
    load_business(&conn, business_id)?;
    load_appointment(&conn, business_id, appointment_id)
}

/// Staff view of a business's appointments, optionally limited to one local date and stylist.
pub async fn list_appointments(
    state: &AppState,
    business_id: &str,
    date: Option<NaiveDate>,
    stylist_id: Option<&str>,
) -> Result<Vec<Appointment>, AppError> {
    let conn = state.store().await?;
    let business = load_business(&conn, business_id)?;

    let range = match date {
        Some(date) => Some(local_day_bounds(&business, date)?),
        None => None,
    };
    queries::list_appointments(&conn, &business.id, range, stylist_id)
}

pub async fn appointment_history(
    state: &AppState,
    business_id: &str,
    appointment_id: &str,
) -> Result<Vec<AppointmentEvent>, AppError> {
    let conn = state.store().await?;
    load_business(&conn, business_id)?;
    let appt = load_appointment(&conn, business_id, appointment_id)?;
    queries::get_appointment_events(&conn, &appt.id)
}

fn local_midnight(business: &Business, date: NaiveDate) -> Option<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    business
        .localize(midnight)
        .or_else(|| business.localize(midnight + Duration::hours(1)))
}

fn local_day_bounds(business: &Business, date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let next = date
        .succ_opt()
        .ok_or_else(|| AppError::Invalid(format!("date out of range: {date}")))?;
    match (local_midnight(business, date), local_midnight(business, next)) {
        (Some(from), Some(to)) => Ok((from, to)),
        _ => Err(AppError::Invalid(format!("date out of range: {date}"))),
    }
}
