use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, Mutex};
use tracing_subscriber::EnvFilter;

use salonbook::config::AppConfig;
use salonbook::db;
use salonbook::handlers;
use salonbook::services::clock::SystemClock;
use salonbook::services::notify::webhook::WebhookNotifier;
use salonbook::services::notify::{self, LogNotifier, Notifier};
use salonbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let mut conn = db::init_db(&config.database_url)?;
    if !config.seed_path.is_empty() {
        db::seed::load_seed_file(&mut conn, &config.seed_path)
            .with_context(|| format!("failed to load seed data from {}", config.seed_path))?;
    }

    let notifier: Arc<dyn Notifier> = if config.notify_webhook_url.is_empty() {
        tracing::info!("no NOTIFY_WEBHOOK_URL set, appointment events will only be logged");
        Arc::new(LogNotifier)
    } else {
        tracing::info!("delivering appointment events to {}", config.notify_webhook_url);
        Arc::new(WebhookNotifier::new(config.notify_webhook_url.clone()))
    };

    let (events_tx, events_rx) = broadcast::channel(256);
    notify::spawn_dispatcher(events_rx, notifier);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        clock: Box::new(SystemClock),
        events_tx,
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
