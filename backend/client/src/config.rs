use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub version_interval: Duration,
    pub event_interval: Duration,
    pub request_timeout: Duration,
    /// Consecutive 401/403 responses before a poller gives up.
    pub max_auth_failures: u32,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            version_interval: Duration::from_secs(5),
            event_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            max_auth_failures: 3,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_intervals(mut self, versions: Duration, events: Duration) -> Self {
        self.version_interval = versions;
        self.event_interval = events;
        self
    }
}
