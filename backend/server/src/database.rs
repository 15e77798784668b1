//! # Redis
//!
//! Shared store behind the sync mechanism.
//!
//! Every server instance talks to the same Redis, so versions bumped by one
//! instance are served by all of them on the next poll.
//!
//! ## Layout
//!
//! - `{ns}:versions`: hash, domain key to version token
//! - `{ns}:updated`: hash, domain key to RFC 3339 last update
//! - `{ns}:events`: sorted set, JSON `{id, eventType, payload}` scored by `createdAt`
//!   in microseconds
//!
//! ## Implementation
//!
//! - Version bumps for a key and `global` go out as one `MULTI` pipeline
//! - Events are stamped by Redis `TIME` inside the script that adds them, so every
//!   instance shares one clock and an event is never visible before its stamp
//! - Reads take `TIME` and run `ZREVRANGEBYSCORE ... LIMIT` in one script, so the
//!   returned timestamp covers exactly what the read could see
//! - Exclusive lower bound on events uses the `(` score prefix
//! - Scores fit an f64 exactly for the next few centuries of microsecond timestamps
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payloads::{EventRecord, SyncEventsResponse, VersionRecord};
use redis::{
    Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::{
    store::{StoreError, StoreResult, SyncStore, read_mark},
    utils::{parse_timestamp, to_score},
};

const APPEND_EVENT: &str = r#"
local t = redis.call('TIME')
local score = tonumber(t[1]) * 1000000 + tonumber(t[2])
redis.call('ZADD', KEYS[1], score, ARGV[1])
return score
"#;

const READ_EVENTS: &str = r#"
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000000 + tonumber(t[2])
local rows = redis.call(
  'ZREVRANGEBYSCORE', KEYS[1], '+inf', ARGV[1], 'WITHSCORES', 'LIMIT', 0, ARGV[2])
return {now, rows}
"#;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEvent {
    id: Uuid,
    event_type: String,
    #[serde(default)]
    payload: Value,
}

fn from_score(score: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(score)
        .ok_or_else(|| StoreError::Corrupt(format!("score {score} is not a timestamp")))
}

pub async fn init_redis(redis_url: &str) -> StoreResult<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

pub struct RedisStore {
    connection: ConnectionManager,
    versions_key: String,
    updated_key: String,
    events_key: String,
    append_script: Script,
    read_script: Script,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager, namespace: &str) -> Self {
        Self {
            connection,
            versions_key: format!("{namespace}:versions"),
            updated_key: format!("{namespace}:updated"),
            events_key: format!("{namespace}:events"),
            append_script: Script::new(APPEND_EVENT),
            read_script: Script::new(READ_EVENTS),
        }
    }
}

#[async_trait]
impl SyncStore for RedisStore {
    async fn upsert_versions(&self, records: &[VersionRecord]) -> StoreResult<()> {
        let mut connection = self.connection.clone();

        let mut pipe = redis::pipe();
        pipe.atomic();
        for record in records {
            pipe.hset(&self.versions_key, &record.key, &record.version)
                .ignore()
                .hset(&self.updated_key, &record.key, record.last_updated.to_rfc3339())
                .ignore();
        }

        pipe.query_async::<()>(&mut connection).await?;
        Ok(())
    }

    async fn versions(&self) -> StoreResult<Vec<VersionRecord>> {
        let mut connection = self.connection.clone();

        let (tokens, updated): (HashMap<String, String>, HashMap<String, String>) = redis::pipe()
            .hgetall(&self.versions_key)
            .hgetall(&self.updated_key)
            .query_async(&mut connection)
            .await?;

        Ok(tokens
            .into_iter()
            .map(|(key, version)| {
                let last_updated = updated
                    .get(&key)
                    .and_then(|raw| parse_timestamp(raw))
                    .unwrap_or_else(|| {
                        warn!("Missing or invalid last update for {key}");
                        DateTime::<Utc>::default()
                    });

                VersionRecord {
                    key,
                    version,
                    last_updated,
                }
            })
            .collect())
    }

    async fn append_event(&self, event_type: &str, payload: Value) -> StoreResult<EventRecord> {
        let mut connection = self.connection.clone();

        let stored = StoredEvent {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            payload,
        };
        let member = serde_json::to_string(&stored)?;

        let score: i64 = self
            .append_script
            .key(&self.events_key)
            .arg(member)
            .invoke_async(&mut connection)
            .await?;

        Ok(EventRecord {
            id: stored.id,
            event_type: stored.event_type,
            payload: stored.payload,
            created_at: from_score(score)?,
        })
    }

    async fn events_since(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StoreResult<SyncEventsResponse> {
        let mut connection = self.connection.clone();

        let min = match since {
            Some(since) => format!("({}", to_score(&since)),
            None => "-inf".to_string(),
        };

        let (read_at, rows): (i64, Vec<(String, f64)>) = self
            .read_script
            .key(&self.events_key)
            .arg(min)
            .arg(limit)
            .invoke_async(&mut connection)
            .await?;

        let events = rows
            .into_iter()
            .filter_map(|(member, score)| {
                let stored: StoredEvent = serde_json::from_str(&member)
                    .map_err(|e| warn!("Skipping undecodable event: {e}"))
                    .ok()?;
                let created_at = from_score(score as i64)
                    .map_err(|e| warn!("Skipping event {}: {e}", stored.id))
                    .ok()?;

                Some(EventRecord {
                    id: stored.id,
                    event_type: stored.event_type,
                    payload: stored.payload,
                    created_at,
                })
            })
            .collect();

        Ok(SyncEventsResponse {
            events,
            timestamp: read_mark(from_score(read_at)?),
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut connection = self.connection.clone();

        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await?;

        Ok(())
    }
}
