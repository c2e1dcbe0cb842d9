use std::sync::Arc;

use delivery_tracker::config::{Config, LogFormat};
use delivery_tracker::engine::mailer::run_mailer;
use delivery_tracker::error::AppError;
use delivery_tracker::state::AppState;
use delivery_tracker::api;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let (app_state, email_rx) = AppState::new(&config);
    let shared_state = Arc::new(app_state);

    if let Some(path) = &config.seed_users_path {
        let seeded = shared_state.users.seed_from_file(path)?;
        tracing::info!(users = seeded, path = %path.display(), "seeded user directory");
    } else {
        tracing::warn!("SEED_USERS_PATH not set; user directory is empty");
    }

    tokio::spawn(run_mailer(email_rx));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shared_state))
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down; closing notification streams");
    state.shutdown();
}
