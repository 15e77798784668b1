//! # Mutation Notifier
//!
//! Business handlers call into this after their own write has committed.
//!
//! ## Contract
//!
//! - Fire-and-forget, log-only: a failed notification never fails the mutation
//!   that triggered it. The worst case is a client refreshing late.
//! - Reads degrade to empty results. An empty version map means "no known
//!   changes" to the pollers, never "everything changed".
//! - Bumping any key other than `global` also bumps `global`.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use payloads::{
    EventRecord, SyncEventsResponse, VersionMap, VersionRecord, keys::GLOBAL, new_token,
};
use serde_json::Value;
use tracing::{debug, error};

use crate::{store::SyncStore, utils::now};

#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn SyncStore>,
    event_limit: usize,
}

impl Notifier {
    pub fn new(store: Arc<dyn SyncStore>, event_limit: usize) -> Self {
        Self { store, event_limit }
    }

    pub async fn bump_version(&self, key: &str) {
        if key.is_empty() {
            error!("Refusing to bump an empty domain key");
            return;
        }

        let now = now();
        let mut records = vec![VersionRecord {
            key: key.to_string(),
            version: new_token(),
            last_updated: now,
        }];

        if key != GLOBAL {
            records.push(VersionRecord {
                key: GLOBAL.to_string(),
                version: new_token(),
                last_updated: now,
            });
        }

        match self.store.upsert_versions(&records).await {
            Ok(()) => debug!("Bumped version for {key}"),
            Err(e) => error!("Failed to bump version for {key}: {e}"),
        }
    }

    pub async fn get_versions(&self) -> VersionMap {
        self.get_version_records()
            .await
            .into_iter()
            .map(|record| (record.key, record.version))
            .collect()
    }

    pub async fn get_version_records(&self) -> Vec<VersionRecord> {
        self.store.versions().await.unwrap_or_else(|e| {
            error!("Failed to read versions: {e}");
            Vec::new()
        })
    }

    pub async fn append_event(&self, event_type: &str, payload: Value) -> Option<EventRecord> {
        self.store
            .append_event(event_type, payload)
            .await
            .map_err(|e| error!("Failed to append {event_type} event: {e}"))
            .ok()
    }

    /// Timestamp of an empty fallback batch is never used to move a cursor.
    pub async fn get_events(&self, since: Option<DateTime<Utc>>) -> SyncEventsResponse {
        self.store
            .events_since(since, self.event_limit)
            .await
            .unwrap_or_else(|e| {
                error!("Failed to read events: {e}");
                SyncEventsResponse {
                    events: Vec::new(),
                    timestamp: now(),
                }
            })
    }

    /// Final step of a committed mutation: log what happened, then mark the keys changed.
    pub async fn record_mutation(&self, event_type: &str, payload: Value, keys: &[&str]) {
        self.append_event(event_type, payload).await;

        for key in keys {
            self.bump_version(key).await;
        }
    }

    pub async fn is_healthy(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}
