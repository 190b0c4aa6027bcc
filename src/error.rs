use thiserror::Error;

use crate::gateway::PricingTableError;

#[derive(Debug, Error)]
pub enum MeterError {
    #[error("API mapping for {routing_key} not found")]
    UnknownRoute { routing_key: String },
    #[error("api error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("invalid pricing table: {0}")]
    Pricing(#[from] PricingTableError),
    #[error("completion task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl MeterError {
    /// True for failures raised by the backend call itself.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::Api { .. } | Self::Http(_) | Self::InvalidResponse(_) | Self::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MeterError>;
