use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DepositPolicy {
    pub required: bool,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub duration_minutes: i64,
    pub buffer_before_minutes: i64,
    pub buffer_after_minutes: i64,
    pub deposit: DepositPolicy,
    pub base_price_cents: i64,
}

impl Service {
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes)
    }

    pub fn end_time(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + self.duration()
    }

    /// The window that must stay free of other work: `[start - before, start + duration + after)`.
    pub fn reserved_window(&self, start: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            start - Duration::minutes(self.buffer_before_minutes),
            self.end_time(start) + Duration::minutes(self.buffer_after_minutes),
        )
    }
}
