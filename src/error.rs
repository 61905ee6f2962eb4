//! Error types for the Techem client.

use reqwest::StatusCode;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Login-related errors.
///
/// Every variant means the same thing to a caller: no token could be
/// obtained. The split only exists for logging.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Login failed with status {status}: {body}")]
    LoginFailed { status: StatusCode, body: String },

    #[error("Login response did not contain a token")]
    MissingToken,

    #[error("Login response parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Query errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("GraphQL error: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    #[error("Response is missing {0}")]
    MissingData(&'static str),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to create HTTP client: {0}")]
    HttpClientInit(String),

    #[error("Token cannot be sent as a header value")]
    InvalidToken,

    #[error("Date offset of {0} days is out of range")]
    DateOutOfRange(u32),
}

impl ApiError {
    /// Whether the provider rejected the token itself.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ApiError::HttpError { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }

    /// Whether a cached token could explain the failure.
    pub fn may_be_stale_token(&self) -> bool {
        self.is_unauthorized() || matches!(self, ApiError::GraphQl(_))
    }
}
