use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Session rejected with {0}")]
    Unauthorized(StatusCode),

    #[error("Unexpected status {0}")]
    Status(StatusCode),

    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}
