use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("invalid server url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("request failed: {0}")]
    Request(String),
    #[error("{message} [API status {status}]")]
    Status { status: u16, message: String },
    #[error("response decode failed: {0}")]
    Decode(String),
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
}
