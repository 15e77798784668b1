use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use chrono::{DateTime, Utc};
use payloads::{SyncEventsResponse, VersionMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{auth::Session, error::AppError, state::AppState};

#[derive(Deserialize)]
pub struct SyncEventsQuery {
    since: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn system_state_handler(State(state): State<Arc<AppState>>) -> Json<VersionMap> {
    Json(state.notifier.get_versions().await)
}

pub async fn sync_events_handler(
    State(state): State<Arc<AppState>>,
    Session(claims): Session,
    query: Result<Query<SyncEventsQuery>, QueryRejection>,
) -> Result<Json<SyncEventsResponse>, AppError> {
    let Query(query) = query.map_err(|e| {
        warn!("Bad sync-events query from {}: {e}", claims.sub);
        AppError::MalformedPayload
    })?;

    let batch = state.notifier.get_events(query.since).await;
    debug!("Serving {} events to {}", batch.events.len(), claims.sub);

    Ok(Json(batch))
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = if state.notifier.is_healthy().await {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
    })
}
