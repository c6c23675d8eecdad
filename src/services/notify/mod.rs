pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::models::AppointmentEvent;
use crate::state::AppState;

/// Delivers appointment events to whoever tells clients and staff about them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &AppointmentEvent) -> anyhow::Result<()>;
}

/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &AppointmentEvent) -> anyhow::Result<()> {
        tracing::info!(
            event_id = event.id,
            appointment_id = %event.appointment_id,
            business_id = %event.business_id,
            event_type = event.event_type.as_str(),
            "appointment event"
        );
        Ok(())
    }
}

/// Broadcasts a committed event to SSE subscribers and the notification dispatcher.
pub fn publish(state: &AppState, event: AppointmentEvent) {
    // No receivers is fine; the event is already persisted
    let _ = state.events_tx.send(event);
}

/// Forwards events to the notifier until the channel closes.
/// Failures are logged and never reach the booking that produced the event.
pub fn spawn_dispatcher(
    mut rx: broadcast::Receiver<AppointmentEvent>,
    notifier: Arc<dyn Notifier>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = notifier.notify(&event).await {
                        tracing::error!(
                            error = %e,
                            event_id = event.id,
                            appointment_id = %event.appointment_id,
                            "failed to deliver appointment notification"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification dispatcher fell behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
