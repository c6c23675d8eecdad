use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{broadcast, Mutex, MutexGuard};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::AppointmentEvent;
use crate::services::clock::Clock;

pub struct AppState {
    /// The appointment store. All writes go through `services::booking`.
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub clock: Box<dyn Clock>,
    pub events_tx: broadcast::Sender<AppointmentEvent>,
}

impl AppState {
    /// Locks the store, giving up with `AppError::Timeout` after the configured write budget.
    pub async fn store(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        tokio::time::timeout(self.config.write_timeout(), self.db.lock())
            .await
            .map_err(|_| {
                tracing::warn!(budget_ms = self.config.write_timeout_ms, "timed out waiting for the booking store");
                AppError::Timeout
            })
    }
}
