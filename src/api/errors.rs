use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::repositories::RepositoryError;
use crate::services::intake::SubmissionError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    TooManyRequests(&'static str),
    ServiceUnavailable(String),
    GatewayTimeout(&'static str),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        let reason = match &err {
            SubmissionError::PermissionDenied => "permission_denied",
            SubmissionError::NotFound(_) => "not_found",
            SubmissionError::Timeout => "timeout",
            SubmissionError::BrokerUnavailable(_) => "broker_unavailable",
            SubmissionError::Serialization(_) => "serialization",
            SubmissionError::Storage(_) => "storage",
            SubmissionError::Database(_) => "database",
        };
        metrics::counter!("submissions_rejected_total", "reason" => reason).increment(1);

        match err {
            SubmissionError::PermissionDenied => {
                ApiError::Forbidden("Not allowed to submit to this test block")
            }
            SubmissionError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            SubmissionError::Timeout => ApiError::GatewayTimeout("Upstream deadline exceeded"),
            SubmissionError::BrokerUnavailable(message) | SubmissionError::Storage(message) => {
                ApiError::ServiceUnavailable(message)
            }
            SubmissionError::Serialization(message) | SubmissionError::Database(message) => {
                ApiError::internal(message, "Failed to accept submission")
            }
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            RepositoryError::Timeout => ApiError::GatewayTimeout("Database deadline exceeded"),
            other => ApiError::internal(other, "Database request failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Unauthorized(message) => {
                let mut response = (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            ApiError::Forbidden(message)
            | ApiError::TooManyRequests(message)
            | ApiError::GatewayTimeout(message) => message.to_string(),
            ApiError::BadRequest(message) | ApiError::NotFound(message) => message,
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                message
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                message
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}
