//! # Sync Store
//!
//! Durable home of the version table and the event log. Shared by every server
//! instance, so it is the only coordination point between them.
//!
//! - [`crate::database::RedisStore`] in production
//! - [`MemoryStore`] for tests and local runs
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use payloads::{EventRecord, SyncEventsResponse, VersionRecord};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::utils::now;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Writes every record in one round trip.
    async fn upsert_versions(&self, records: &[VersionRecord]) -> StoreResult<()>;

    async fn versions(&self) -> StoreResult<Vec<VersionRecord>>;

    /// Stamps `createdAt` with the store clock at the moment the event becomes visible.
    async fn append_event(&self, event_type: &str, payload: Value) -> StoreResult<EventRecord>;

    /// Events strictly newer than `since`, newest first, at most `limit`.
    ///
    /// The returned timestamp comes from the same clock and the same atomic step as
    /// the read. Every event stamped after it was not yet visible to this read.
    async fn events_since(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StoreResult<SyncEventsResponse>;

    async fn ping(&self) -> StoreResult<()>;
}

#[derive(Default)]
struct Tables {
    versions: HashMap<String, VersionRecord>,
    events: Vec<EventRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn upsert_versions(&self, records: &[VersionRecord]) -> StoreResult<()> {
        self.check()?;

        let mut tables = self.tables.write().await;
        for record in records {
            tables.versions.insert(record.key.clone(), record.clone());
        }

        Ok(())
    }

    async fn versions(&self) -> StoreResult<Vec<VersionRecord>> {
        self.check()?;

        Ok(self.tables.read().await.versions.values().cloned().collect())
    }

    async fn append_event(&self, event_type: &str, payload: Value) -> StoreResult<EventRecord> {
        self.check()?;

        let mut tables = self.tables.write().await;
        let event = EventRecord::new(event_type, payload, now());
        tables.events.push(event.clone());

        Ok(event)
    }

    async fn events_since(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StoreResult<SyncEventsResponse> {
        self.check()?;

        let tables = self.tables.read().await;
        let timestamp = read_mark(now());

        let mut events: Vec<_> = tables
            .events
            .iter()
            .filter(|event| since.is_none_or(|since| event.created_at > since))
            .cloned()
            .collect();

        // stable, so equal stamps keep insertion order before the reverse
        events.sort_by_key(|event| event.created_at);
        events.reverse();
        events.truncate(limit);

        Ok(SyncEventsResponse { events, timestamp })
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }
}

/// One microsecond behind the read, so a write landing in the same microsecond is
/// still after the cursor.
pub fn read_mark(read_at: DateTime<Utc>) -> DateTime<Utc> {
    read_at - TimeDelta::microseconds(1)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    async fn append_spaced(store: &MemoryStore, event_types: &[&str]) -> Vec<EventRecord> {
        let mut events = Vec::new();
        for event_type in event_types {
            events.push(store.append_event(event_type, json!({})).await.unwrap());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        events
    }

    #[tokio::test]
    async fn events_since_is_exclusive_and_newest_first() {
        let store = MemoryStore::new();
        let appended = append_spaced(&store, &["A", "B", "C"]).await;

        let batch = store
            .events_since(Some(appended[0].created_at), 10)
            .await
            .unwrap();
        let types: Vec<_> = batch.events.iter().map(|e| e.event_type.as_str()).collect();

        assert_eq!(types, vec!["C", "B"]);
    }

    #[tokio::test]
    async fn events_since_respects_limit() {
        let store = MemoryStore::new();
        let appended = append_spaced(&store, &["A", "B", "C", "D", "E"]).await;

        let batch = store.events_since(None, 2).await.unwrap();

        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0], appended[4]);
        assert_eq!(batch.events[1], appended[3]);
    }

    #[tokio::test]
    async fn read_timestamp_is_behind_nothing_visible() {
        let store = MemoryStore::new();
        append_spaced(&store, &["A", "B"]).await;

        let batch = store.events_since(None, 10).await.unwrap();
        let later = store.append_event("C", json!({})).await.unwrap();

        let read_at = batch.timestamp + TimeDelta::microseconds(1);
        assert!(batch.events.iter().all(|e| e.created_at <= read_at));
        assert!(later.created_at > batch.timestamp);
    }

    #[tokio::test]
    async fn failing_store_errors_everywhere() {
        let store = MemoryStore::new();
        store.set_failing(true);

        assert!(store.versions().await.is_err());
        assert!(store.events_since(None, 1).await.is_err());
        assert!(store.append_event("A", json!({})).await.is_err());
        assert!(store.ping().await.is_err());

        store.set_failing(false);
        assert!(store.ping().await.is_ok());
    }
}
