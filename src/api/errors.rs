//! Proxy error types and plain-text responses
//!
//! Client mistakes come back as 400 with a short message; upstream and
//! storage failures surface the first failing call's status verbatim.
//! Nothing is retried.

use crate::storage::StorageError;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Proxy API errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing action type")]
    MissingAction,

    #[error("Unknown action {action} for {method}")]
    UnknownAction { action: String, method: Method },

    #[error("Missing {0}")]
    MissingParam(&'static str),

    #[error("Missing request body")]
    MissingBody,

    #[error("Missing or incomplete body")]
    IncompleteBody,

    #[error("Object Not Found")]
    NotFound,

    #[error("{0}")]
    Storage(String),

    /// A non-2xx answer from the upstream API, the part destination or the
    /// bucket backend; status carried through verbatim.
    #[error("{reason}")]
    Upstream { status: StatusCode, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingAction => StatusCode::BAD_REQUEST,
            ProxyError::UnknownAction { .. } => StatusCode::BAD_REQUEST,
            ProxyError::MissingParam(_) => StatusCode::BAD_REQUEST,
            ProxyError::MissingBody => StatusCode::BAD_REQUEST,
            ProxyError::IncompleteBody => StatusCode::BAD_REQUEST,
            ProxyError::NotFound => StatusCode::NOT_FOUND,
            ProxyError::Storage(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream { status, .. } => *status,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

impl From<StorageError> for ProxyError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => ProxyError::NotFound,
            other => ProxyError::Storage(other.to_string()),
        }
    }
}
