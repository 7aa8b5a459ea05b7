//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, OrderError, RepositoryError};
use reporting::ReportingError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unrecognized bearer token.
    Unauthorized,
    /// Well-formed request with unacceptable content.
    Unprocessable(String),
    /// Request the extractors could not parse.
    Rejected(StatusCode, String),
    /// Domain logic error.
    Domain(DomainError),
    /// Dashboard computation error.
    Reporting(ReportingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Missing or invalid bearer token".to_string(),
            ),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Rejected(status, msg) => (status, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Reporting(err) => {
                tracing::error!(error = %err, "dashboard computation failed");
                internal()
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::Order(order_err) => match order_err {
            OrderError::InvalidCart(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            OrderError::OutOfStock { .. } | OrderError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, err.to_string())
            }
            OrderError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        },
        DomainError::Forbidden { .. } => (StatusCode::FORBIDDEN, err.to_string()),
        DomainError::Repository(RepositoryError::OrderNotFound(_)) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        DomainError::Repository(
            RepositoryError::StatusConflict { .. } | RepositoryError::InsufficientStock { .. },
        ) => (StatusCode::CONFLICT, err.to_string()),
        DomainError::Repository(_) | DomainError::Invoice(_) => {
            tracing::error!(error = %err, "internal server error");
            internal()
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<ReportingError> for ApiError {
    fn from(err: ReportingError) -> Self {
        ApiError::Reporting(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}
