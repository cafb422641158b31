mod api;
mod config;
mod engine;
mod error;
mod geo;
mod location;
mod models;
mod observability;
mod state;
mod upstream;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let upstream = Arc::new(upstream::HttpDeliveryApi::new(
        config.upstream_base_url.clone(),
        config.geocode_delay,
    ));
    let shared_state = Arc::new(state::AppState::new(config, upstream));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", shared_state.config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = shared_state.config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
