use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::AppointmentEvent;
use crate::services::booking::load_business;
use crate::state::AppState;

fn to_sse(event: &AppointmentEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default()
        .id(event.id.to_string())
        .event(event.event_type.as_str())
        .data(data)
}

// GET /api/businesses/:business_id/events (SSE stream)
#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
    pub last_id: Option<i64>,
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Auth via query param (EventSource can't set headers)
    if query.token.as_deref() != Some(state.config.admin_token.as_str()) {
        return Err(AppError::Unauthorized);
    }

    // Subscribe before reading history so nothing committed in between is missed
    let rx = state.events_tx.subscribe();

    let catchup_events = {
        let conn = state.store().await?;
        load_business(&conn, &business_id)?;
        queries::get_events_since(&conn, &business_id, query.last_id.unwrap_or(0))?
    };
    let replayed_up_to = catchup_events
        .last()
        .map(|e| e.id)
        .unwrap_or(query.last_id.unwrap_or(0));

    let catchup_stream = tokio_stream::iter(
        catchup_events
            .into_iter()
            .map(|event| Ok::<_, Infallible>(to_sse(&event))),
    );

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.business_id == business_id && event.id > replayed_up_to => {
            Some(Ok(to_sse(&event)))
        }
        Ok(_) => None,
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "event stream subscriber lagged");
            None
        }
    });

    let keepalive_stream = tokio_stream::StreamExt::map(
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(Duration::from_secs(30))),
        |_| Ok(Event::default().comment("keepalive")),
    );

    let combined = catchup_stream.chain(live_stream);
    let merged = StreamExt::merge(combined, keepalive_stream);

    Ok(Sse::new(merged))
}
