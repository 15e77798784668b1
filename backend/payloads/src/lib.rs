//! # Payloads
//!
//! Wire types shared between the sync server and its pollers.
//!
//! ## Endpoints
//! - `GET /system-state`: [`VersionMap`]
//! - `GET /sync-events?since=`: [`SyncEventsResponse`]
//!
//! ## Notes
//! - Version tokens are equality-only. Never order or parse them.
//! - Timestamps are UTC and serialized as RFC 3339.
//! - Field names are camelCase on the wire.
use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub mod keys;

/// Domain key to current version token.
pub type VersionMap = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub key: String,
    pub version: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: Uuid,
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(event_type: impl Into<String>, payload: Value, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEventsResponse {
    pub events: Vec<EventRecord>,
    pub timestamp: DateTime<Utc>,
}

/// Fresh opaque version token.
pub fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// Query-string form of a timestamp, always `Z` suffixed so it survives URL encoding.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn event_record_uses_camel_case() {
        let event = EventRecord::new("SETTINGS_UPDATE", json!({"currency": "NGN"}), Utc::now());
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["eventType"], "SETTINGS_UPDATE");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("event_type").is_none());
    }

    #[test]
    fn event_record_payload_defaults_to_null() {
        let raw = r#"{
            "id": "0b6f3f0e-4c55-4d5e-9a57-3c1f2d7f9a10",
            "eventType": "USER_UPDATE",
            "createdAt": "2025-03-01T12:00:00Z"
        }"#;

        let event: EventRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(event.payload, Value::Null);
    }

    #[test]
    fn tokens_are_fresh() {
        assert_ne!(new_token(), new_token());
    }

    #[test]
    fn formatted_timestamp_is_utc_zulu() {
        let timestamp = DateTime::parse_from_rfc3339("2025-03-01T12:00:00.5+01:00")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(format_timestamp(&timestamp), "2025-03-01T11:00:00.500000Z");
    }
}
