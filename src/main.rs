use std::sync::Arc;

use delivery_dispatch::api;
use delivery_dispatch::config::{Config, LogFormat};
use delivery_dispatch::engine::notifications::run_notification_worker;
use delivery_dispatch::error::DispatchError;
use delivery_dispatch::models::actor::{Actor, Role};
use delivery_dispatch::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), DispatchError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let (app_state, events_rx) = AppState::new(&config);
    let shared_state = Arc::new(app_state);

    if let Some(name) = &config.bootstrap_admin {
        let admin = shared_state
            .actors
            .insert(Actor::new(name.clone(), "", Role::Admin))?;
        tracing::info!(actor_id = %admin.id, name = %admin.name, "bootstrap admin created");
    }

    tokio::spawn(run_notification_worker(
        shared_state.notifications.clone(),
        events_rx,
    ));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| DispatchError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| DispatchError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
