use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use emberwatch::api::stream::WebSocketChannel;
use emberwatch::api::{RestClient, Session};
use emberwatch::config::load_config;
use emberwatch::{DashboardView, EmberError, MonitorSession, SessionSettings};

#[tokio::main]
async fn main() -> Result<(), EmberError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("emberwatch=info")),
        )
        .init();

    let config_path = env::var("EMBERWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yaml"));
    let config = load_config(&config_path)?;
    info!(base_url = %config.api.base_url, "starting EmberWatch");

    let session = Session::new();
    let client = Arc::new(RestClient::new(
        &config.api.base_url,
        session.clone(),
        config.api.request_timeout(),
    )?);

    // A token from the environment skips login
    session
        .establish(client.as_ref(), env::var("EMBERWATCH_TOKEN").ok(), config.auth.as_ref())
        .await?;

    let channel = WebSocketChannel::new(&config.api.base_url, &config.stream.path)?;
    let handle = MonitorSession::new(client, session, SessionSettings::from(&config))
        .with_push_channel(Arc::new(channel))
        .start()?;

    let mut views = handle.subscribe();
    let reporter = tokio::spawn(async move {
        while views.changed().await.is_ok() {
            let view = views.borrow_and_update().clone();
            report(&view);
        }
    });

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");

    handle.shutdown().await;
    reporter.abort();

    info!("shutdown complete");
    Ok(())
}

fn report(view: &DashboardView) {
    let selected = view.selected_patient().map(|p| p.name.as_str()).unwrap_or("-");
    let risk = view.analytics.as_ref().map(|a| a.risk_score);

    info!(
        patients = view.patients.len(),
        selected,
        vitals = view.vitals_history.len(),
        alerts = view.alerts.len(),
        ?risk,
        "dashboard updated"
    );
    if let Some(error) = &view.last_error {
        warn!(kind = ?error.kind, "{}", error.message);
    }
}
