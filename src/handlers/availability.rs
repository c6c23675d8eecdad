use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::parse_date;
use crate::errors::AppError;
use crate::models::TimeSlot;
use crate::services::availability::{self, AvailabilityQuery};
use crate::services::schedule::StylistFilter;
use crate::state::AppState;

// GET /api/businesses/:business_id/availability
#[derive(Deserialize)]
pub struct AvailabilityParams {
    pub service_id: String,
    pub date: String,
    /// A stylist id, or absent / "any" for every qualified stylist.
    pub stylist_id: Option<String>,
    pub exclude_appointment_id: Option<String>,
    #[serde(default)]
    pub include_unavailable: bool,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub business_id: String,
    pub service_id: String,
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let query = AvailabilityQuery {
        service_id: params.service_id,
        date: parse_date(&params.date)?,
        stylist: StylistFilter::from_param(params.stylist_id.as_deref()),
        exclude_appointment_id: params.exclude_appointment_id.filter(|id| !id.is_empty()),
        include_unavailable: params.include_unavailable,
    };

    let slots = availability::available_slots(&state, &business_id, &query).await?;

    Ok(Json(AvailabilityResponse {
        business_id,
        service_id: query.service_id,
        date: query.date,
        slots,
    }))
}
