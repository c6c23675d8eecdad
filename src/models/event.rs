use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A domain event appended to an appointment's history and published to notification consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentEvent {
    pub id: i64,
    pub appointment_id: String,
    pub business_id: String,
    pub event_type: EventType,
    pub old_start: Option<DateTime<Utc>>,
    pub new_start: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Confirmed,
    Started,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Confirmed => "confirmed",
            EventType::Started => "started",
            EventType::Completed => "completed",
            EventType::Cancelled => "cancelled",
            EventType::NoShow => "no_show",
            EventType::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(EventType::Created),
            "confirmed" => Some(EventType::Confirmed),
            "started" => Some(EventType::Started),
            "completed" => Some(EventType::Completed),
            "cancelled" => Some(EventType::Cancelled),
            "no_show" => Some(EventType::NoShow),
            "rescheduled" => Some(EventType::Rescheduled),
            _ => None,
        }
    }
}
