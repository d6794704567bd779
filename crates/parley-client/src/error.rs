use thiserror::Error;

/// Everything a client call can fail with. Each variant renders its own
/// user-facing message so the UI never shows a generic failure.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Please log in again")]
    Unauthorized,

    #[error("That email is already registered")]
    Conflict,

    #[error("Server unavailable, try again shortly")]
    Unavailable,

    #[error("Unexpected response from server ({0})")]
    Status(u16),

    #[error("Could not reach the server: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Realtime connection failed: {0}")]
    Gateway(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Realtime handshake failed: {0}")]
    Handshake(String),

    #[error("Malformed server payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Store outages and dropped connections are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Http(_) | Self::Gateway(_))
    }
}
