//! Where pollers get their data from. [`HttpSource`] talks to the sync server.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payloads::{SyncEventsResponse, VersionMap, format_timestamp};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::{config::ClientConfig, error::PollError};

#[async_trait]
pub trait SyncSource: Send + Sync {
    async fn fetch_versions(&self) -> Result<VersionMap, PollError>;

    async fn fetch_events(&self, since: DateTime<Utc>) -> Result<SyncEventsResponse, PollError>;
}

pub struct HttpSource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpSource {
    pub fn new(config: &ClientConfig) -> Result<Self, PollError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{path}", self.base_url));

        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn check(response: Response) -> Result<Response, PollError> {
    match response.status() {
        status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            Err(PollError::Unauthorized(status))
        }
        status if !status.is_success() => Err(PollError::Status(status)),
        _ => Ok(response),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, PollError> {
    let body = check(response)?.bytes().await?;

    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl SyncSource for HttpSource {
    async fn fetch_versions(&self) -> Result<VersionMap, PollError> {
        decode(self.get("/system-state").send().await?).await
    }

    async fn fetch_events(&self, since: DateTime<Utc>) -> Result<SyncEventsResponse, PollError> {
        let response = self
            .get("/sync-events")
            .query(&[("since", format_timestamp(&since))])
            .send()
            .await?;

        decode(response).await
    }
}
