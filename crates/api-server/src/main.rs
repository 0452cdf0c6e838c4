//! HelioFleet control plane API server
//!
//! Device-facing runtime and multi-tenant policy core for a fleet of
//! networked solar water heaters: auth, telemetry ingest, device twins,
//! commands, alerts, OTA rollouts and analytics.

mod audit;
mod auth;
mod config;
mod error;
mod jobs;
mod routes;
mod state;
#[cfg(test)]
mod testutil;

use std::net::SocketAddr;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_server=debug,hf_core=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    tracing::info!("Using data directory: {}", config.data_dir);

    let app_state = AppState::new(config)
        .await
        .expect("Failed to initialize application state");

    jobs::start_background_jobs(&app_state);
    tracing::info!("Background jobs started");

    let app = routes::router()
        .with_state(app_state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(listener, app).await.expect("Server error");
}
