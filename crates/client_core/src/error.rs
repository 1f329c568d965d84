use shared::error::ApiException;
use thiserror::Error;

/// Failures talking to the portal backend.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid api base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned HTTP {0}")]
    Status(u16),
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("backend rejected request: {0}")]
    Api(#[from] ApiException),
}
