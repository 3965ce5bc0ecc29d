//! HTTP error mapping
//!
//! Domain errors are turned into statuses at the router boundary; bodies
//! are `{"error": <message>}` JSON except on the transport endpoints,
//! which speak plaintext.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    PermissionDenied(String),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::PermissionDenied(m)
            | ApiError::BadRequest(m)
            | ApiError::Unavailable(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.message() });
        Response::builder()
            .status(self.status())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

impl From<hubd_git::Error> for ApiError {
    fn from(e: hubd_git::Error) -> Self {
        match e {
            hubd_git::Error::RepositoryNotExists => {
                ApiError::NotFound("repository not found".to_string())
            }
            hubd_git::Error::RepositoryExists => {
                ApiError::Conflict("Repository already exists".to_string())
            }
            hubd_git::Error::RefNotFound(_) | hubd_git::Error::PathNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            hubd_git::Error::NotADirectory(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{e:#}"))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("task panicked: {e}"))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Plaintext error response used by the transport endpoints.
pub fn plain(status: StatusCode, message: &str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(message.to_string()))
        .unwrap()
}
