//! API error handling
//!
//! One struct per response body and one mapping from the domain error
//! taxonomy to HTTP status codes, so every handler returns the same
//! shape.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use domain_cancellation::CancellationError;
use domain_payment::PaymentError;
use domain_scheduler::SchedulerError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Upstream gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Unauthorized".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::LimitExceeded(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, "limit_exceeded", msg.clone())
            }
            ApiError::GatewayUnavailable(msg) => {
                (StatusCode::BAD_GATEWAY, "gateway_unavailable", msg.clone())
            }
            ApiError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg.clone())
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotFound(msg) => ApiError::NotFound(msg),
            PaymentError::InvalidState { .. } => ApiError::Conflict(err.to_string()),
            PaymentError::Conflict(msg) => ApiError::Conflict(msg),
            PaymentError::DuplicateAuthorization(_) => ApiError::Conflict(err.to_string()),
            PaymentError::Unauthorized(msg) => ApiError::Forbidden(msg),
            PaymentError::LimitExceeded(msg) => ApiError::LimitExceeded(msg),
            PaymentError::GatewayUnavailable(msg) => ApiError::GatewayUnavailable(msg),
            PaymentError::GatewayRejected(msg) => ApiError::Conflict(msg),
            PaymentError::DeadlineElapsed { .. } => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CancellationError> for ApiError {
    fn from(err: CancellationError) -> Self {
        match err {
            CancellationError::LimitExceeded { .. } => ApiError::LimitExceeded(err.to_string()),
            CancellationError::NotCancellable { .. } => ApiError::Conflict(err.to_string()),
            CancellationError::Unauthorized(msg) => ApiError::Forbidden(msg),
            CancellationError::Payment(inner) => inner.into(),
            CancellationError::Storage(inner) => ApiError::Internal(inner.to_string()),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::JobNotFound(id) => ApiError::NotFound(format!("job {id}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use core_kernel::BookingId;
    use domain_payment::AuthorizationStatus;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_domain_errors_map_to_expected_status_codes() {
        let invalid = PaymentError::InvalidState {
            operation: "capture",
            status: AuthorizationStatus::Pending,
        };
        assert_eq!(status_of(invalid.into()), StatusCode::CONFLICT);

        let dup = PaymentError::DuplicateAuthorization(BookingId::new());
        assert_eq!(status_of(dup.into()), StatusCode::CONFLICT);

        let unavailable = PaymentError::GatewayUnavailable("down".to_string());
        assert_eq!(status_of(unavailable.into()), StatusCode::BAD_GATEWAY);

        let limit = CancellationError::LimitExceeded { used: 1, allowance: 1 };
        assert_eq!(status_of(limit.into()), StatusCode::TOO_MANY_REQUESTS);

        let denied = PaymentError::Unauthorized("not your booking".to_string());
        assert_eq!(status_of(denied.into()), StatusCode::FORBIDDEN);
    }
}
