pub mod appointments;
pub mod availability;
pub mod events;
pub mod health;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use chrono::NaiveDate;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/businesses/:business_id/availability",
            get(availability::get_availability),
        )
        .route(
            "/api/businesses/:business_id/appointments",
            post(appointments::create_appointment),
        )
        .route(
            "/api/businesses/:business_id/appointments/:id",
            get(appointments::get_appointment),
        )
        .route(
            "/api/businesses/:business_id/appointments/:id/reschedule",
            post(appointments::reschedule_appointment),
        )
        .route(
            "/api/businesses/:business_id/appointments/:id/cancel",
            post(appointments::cancel_appointment),
        )
        .route(
            "/api/businesses/:business_id/appointments/:id/confirm",
            post(appointments::confirm_appointment),
        )
        .route(
            "/api/businesses/:business_id/appointments/:id/start",
            post(appointments::start_appointment),
        )
        .route(
            "/api/businesses/:business_id/appointments/:id/complete",
            post(appointments::complete_appointment),
        )
        .route(
            "/api/businesses/:business_id/appointments/:id/no-show",
            post(appointments::mark_no_show),
        )
        .route(
            "/api/businesses/:business_id/appointments/:id/history",
            get(appointments::appointment_history),
        )
        .route(
            "/api/admin/businesses/:business_id/appointments",
            get(appointments::list_appointments),
        )
        .route(
            "/api/businesses/:business_id/events",
            get(events::events_stream),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// True when the request carries the staff token.
pub(crate) fn is_staff(headers: &HeaderMap, expected_token: &str) -> bool {
    bearer_token(headers).is_some_and(|t| t == expected_token)
}

pub(crate) fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    if is_staff(headers, expected_token) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Invalid(format!("invalid date (expected YYYY-MM-DD): {s}")))
}
