//! Documentation of the POS system-state sync service.
//!
//! Open tills, kitchen displays and admin screens poll this service to find out
//! when server-side state changed underneath them.
//!
//!
//!
//! # General Infrastructure
//! - Business handlers (menu, orders, users, settings) commit their own writes first
//! - As a last step they call [`notifier::Notifier::record_mutation`] or
//!   [`notifier::Notifier::bump_version`]
//! - Versions and events live in Redis, shared by every server instance
//! - Browsers poll `/system-state` for version tokens and `/sync-events` for what happened
//!
//!
//!
//! # Endpoints
//! - `GET /system-state`: map of domain key to version token
//! - `GET /sync-events?since=<ISO8601>`: `{ events, timestamp }`, session required
//! - `GET /health`: store connectivity
//!
//!
//!
//! # Notes
//!
//! ## Polling over push
//! The requirement is "other open sessions eventually notice a change", not instant
//! delivery. Polling keeps the server stateless per client. A push transport could
//! replace it without touching the store contracts.
//!
//! ## The global key
//! Every bump of a specific key also bumps `global`. A poller may see one before the
//! other for a poll or two. Only eventually observing both changed matters.
//!
//! ## Timestamps
//! Redis stamps each event with its own `TIME` as it inserts it, and `/sync-events`
//! reads its timestamp from that same clock in the same script as the range. Clients
//! advance their cursor to it rather than to their own clock, so neither skew nor a
//! write still in flight can drop an event. Duplicates are possible at the boundary.
//! Handlers must be idempotent.
//!
//!
//!
//! # Setup
//!
//! Secrets are read from `/run/secrets/`.
//! ```sh
//! printf '%s' "$(openssl rand -hex 32)" > /run/secrets/SESSION_SECRET
//! ```
//!
//! Environment.
//! ```sh
//! RUST_PORT=1111 REDIS_URL=redis://redis:6379 RUST_LOG=server=debug cargo run -p pos-sync
//! ```
//!
//! Watch a running server as a client would.
//! ```sh
//! cargo run -p tester -- --url http://localhost:1111 watch
//! ```
use std::{future::pending, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod notifier;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

use error::AppError;
use routes::{health_handler, sync_events_handler, system_state_handler};
use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/system-state", get(system_state_handler))
        .route("/sync-events", get(sync_events_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<(), AppError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await?;

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = build_router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A listener that cannot be installed is logged and
/// never fires, leaving the other one in charge.
async fn shutdown_signal() {
    let interrupt = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Ctrl+C listener unavailable: {e}");
                pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                error!("SIGTERM listener unavailable: {e}");
                pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = pending::<()>();

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }
}
