use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use parley_types::api::ErrorBody;

/// Failures of the message engine, pin coordinator and chat operations.
///
/// Every variant maps to a distinct status and `error` kind so clients can
/// tell them apart. Forbidden never names the owning user.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input, e.g. a missing chat id or empty content.
    #[error("{0}")]
    Validation(String),

    /// Referenced entity is absent. Holds the entity name.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Requester lacks ownership or membership. Holds the attempted action.
    #[error("Not authorized to {0}")]
    Forbidden(&'static str),

    /// The record store failed. Safe to retry with backoff.
    #[error("store unavailable: {0}")]
    Store(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Store(_) => "unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Store(e) => {
                error!("Store failure: {:#}", e);
                "The server is temporarily unavailable, please retry".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.kind().to_string(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}
