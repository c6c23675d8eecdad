use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{check_auth, is_staff, parse_date};
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentEvent, CancelActor, ClientRef};
use crate::services::booking::{self, NewAppointment};
use crate::services::schedule::StylistFilter;
use crate::state::AppState;

// POST /api/businesses/:business_id/appointments
#[derive(Deserialize)]
pub struct CreateAppointmentRequest {
    pub service_id: String,
    pub stylist_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub client_id: Option<String>,
    pub walk_in_name: Option<String>,
    pub notes: Option<String>,
}

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
    Json(body): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    let client = match (body.client_id, body.walk_in_name) {
        (Some(id), None) => ClientRef::Registered(id),
        (None, Some(name)) => ClientRef::WalkIn(name),
        _ => {
            return Err(AppError::Invalid(
                "exactly one of client_id or walk_in_name is required".to_string(),
            ))
        }
    };

    let request = NewAppointment {
        service_id: body.service_id,
        stylist: StylistFilter::from_param(body.stylist_id.as_deref()),
        start_time: body.start_time,
        client,
        notes: body.notes,
    };
    let appt = booking::create_appointment(&state, &business_id, request).await?;

    Ok((StatusCode::CREATED, Json(appt)))
}

// GET /api/businesses/:business_id/appointments/:id
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path((business_id, id)): Path<(String, String)>,
) -> Result<Json<Appointment>, AppError> {
    let appt = booking::get_appointment(&state, &business_id, &id).await?;
    Ok(Json(appt))
}

// POST /api/businesses/:business_id/appointments/:id/reschedule
#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub start_time: DateTime<Utc>,
}

pub async fn reschedule_appointment(
    State(state): State<Arc<AppState>>,
    Path((business_id, id)): Path<(String, String)>,
    Json(body): Json<RescheduleRequest>,
) -> Result<Json<Appointment>, AppError> {
    let appt = booking::reschedule_appointment(&state, &business_id, &id, body.start_time).await?;
    Ok(Json(appt))
}

// POST /api/businesses/:business_id/appointments/:id/cancel
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
) -> Result<Json<Appointment>, AppError> {
    // Staff may cancel inside the cancellation window; clients may not
    let actor = if is_staff(&headers, &state.config.admin_token) {
        CancelActor::Staff
    } else {
        CancelActor::Client
    };
    let appt = booking::cancel_appointment(&state, &business_id, &id, actor).await?;
    Ok(Json(appt))
}

// POST /api/businesses/:business_id/appointments/:id/confirm
#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub payment_reference: Option<String>,
}

pub async fn confirm_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
    body: Option<Json<ConfirmRequest>>,
) -> Result<Json<Appointment>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let payment_reference = body.and_then(|Json(b)| b.payment_reference);
    let appt = booking::confirm_appointment(&state, &business_id, &id, payment_reference).await?;
    Ok(Json(appt))
}

// POST /api/businesses/:business_id/appointments/:id/start
pub async fn start_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
) -> Result<Json<Appointment>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let appt = booking::start_appointment(&state, &business_id, &id).await?;
    Ok(Json(appt))
}

// POST /api/businesses/:business_id/appointments/:id/complete
pub async fn complete_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
) -> Result<Json<Appointment>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let appt = booking::complete_appointment(&state, &business_id, &id).await?;
    Ok(Json(appt))
}

// POST /api/businesses/:business_id/appointments/:id/no-show
pub async fn mark_no_show(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
) -> Result<Json<Appointment>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let appt = booking::mark_no_show(&state, &business_id, &id).await?;
    Ok(Json(appt))
}

// GET /api/businesses/:business_id/appointments/:id/history
pub async fn appointment_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
) -> Result<Json<Vec<AppointmentEvent>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let events = booking::appointment_history(&state, &business_id, &id).await?;
    Ok(Json(events))
}

// GET /api/admin/businesses/:business_id/appointments
#[derive(Deserialize)]
pub struct ListQuery {
    pub date: Option<String>,
    pub stylist_id: Option<String>,
}

pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let date = query.date.as_deref().map(parse_date).transpose()?;
    let stylist_id = query.stylist_id.as_deref().filter(|s| !s.is_empty());
    let appointments = booking::list_appointments(&state, &business_id, date, stylist_id).await?;
    Ok(Json(appointments))
}
