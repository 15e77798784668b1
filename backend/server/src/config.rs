use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub namespace: String,
    pub event_limit: usize,
    pub session_secret: String,
}

impl Config {
    pub fn load() -> Self {
        let lookup = |key: &str| env::var(key).ok();

        Self::from_lookup(lookup, read_secret("SESSION_SECRET", lookup))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>, session_secret: String) -> Self {
        Self {
            port: setting(&lookup, "RUST_PORT", 1111),
            redis_url: setting(&lookup, "REDIS_URL", "redis://redis:6379".to_string()),
            namespace: setting(&lookup, "SYNC_NAMESPACE", "sync".to_string()),
            event_limit: setting(&lookup, "SYNC_EVENT_LIMIT", 1000),
            session_secret,
        }
    }
}

/// Unset keys fall back to `default`. A value that is set but does not parse stops
/// startup, naming the key and the offending value.
fn setting<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => panic!("Environment misconfigured! {key}={raw:?}: {e}"),
    }
}

/// Docker secret first, then a variable of the same name for local runs.
fn read_secret(name: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let from_file = read_to_string(format!("/run/secrets/{name}"))
        .map(|s| s.trim().to_string())
        .map_err(|e| warn!("Failed to read {name} from /run/secrets: {e}"))
        .ok();

    from_file
        .or_else(|| lookup(name))
        .filter(|secret| !secret.is_empty())
        .unwrap_or_else(|| panic!("Secrets misconfigured! {name} is missing or empty"))
}
