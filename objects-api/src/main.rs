use tracing_subscriber::EnvFilter;

use objects_api::{AppState, app, config::ServiceConfig};

#[tokio::main]
async fn main() {

    // stdout is reserved for audit lines, diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()
        .expect("Invalid service configuration");

    let state = AppState::from_config(&config).await
        .expect("Failed to build application state");

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await
        .expect("Failed to bind TCP listener");

    tracing::info!("objects-api listening on port {}", config.port);

    axum::serve(listener, app(state))
        .await
        .expect("Failed to start server");
}
