use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range input
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Authenticated, but not allowed to touch this resource
    #[error("{0}")]
    Forbidden(String),

    #[error("No caller identity on request")]
    Unauthorized,

    /// Persistence layer unavailable; safe for the caller to retry
    #[error("Store unavailable: {0}")]
    TransientStore(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::TransientStore(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to a client; server-side failures stay generic.
    pub fn client_message(&self) -> String {
        match self {
            Error::TransientStore(_) => "Storage temporarily unavailable".to_string(),
            Error::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Error::TransientStore(e) => error!(error = %e, "store operation failed"),
            Error::Internal(msg) => error!(error = %msg, "internal error"),
            _ => {}
        }
        let error_message = self.client_message();

        let body = Json(json!({
            "error": {
                "message": error_message
            }
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
