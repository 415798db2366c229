use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triage_api::config::ServerConfig;
use triage_api::error::AppError;
use triage_api::loader::RouteLoader;
use triage_api::registrar::Registrar;
use triage_api::render::JsonViewRenderer;
use triage_api::router::build_app_router;
use triage_api::routes;
use triage_core::route_config::RouteConfigMap;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let route_config = match &config.route_config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading route configuration");
            RouteConfigMap::from_file(path)?
        }
        None => RouteConfigMap::new(),
    };

    // --- Routes ---
    let catalog = routes::catalog();
    let descriptors = RouteLoader::from_settings(&config.pipeline).load(
        &catalog,
        &config.routes_dir,
        &route_config,
    )?;

    let mut registrar = Registrar::new(Arc::new(JsonViewRenderer), config.pipeline.clone());
    registrar.register_all(descriptors)?;
    tracing::info!(routes = registrar.len(), "Routes registered");

    // --- Router ---
    let app = build_app_router(registrar, &config);

    // --- Start server ---
    let host = config.host.parse::<IpAddr>().map_err(|e| {
        AppError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid HOST address `{}`: {e}", config.host),
        ))
    })?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
