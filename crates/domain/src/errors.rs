//! Custom error types with proper HTTP status code mappings.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// API error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

/// Domain errors with HTTP status code mappings
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Bad rating, limit, or payload (400 Bad Request)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Multiple validation errors (400 Bad Request)
    #[error("Validation failed")]
    ValidationErrors(Vec<String>),

    /// Unknown card, problem, or user (404 Not Found)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unauthorized (401 Unauthorized)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (403 Forbidden)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A write with the same request id is still in flight (409 Conflict)
    #[error("Duplicate request in flight")]
    DuplicateInFlight,

    /// Rate limit exceeded (429 Too Many Requests). On recommendation
    /// paths this is consumed as a fallback reason instead.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Provider call failed; consumed by the chain executor.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Optimizer abandoned a run on non-finite loss or gradient.
    #[error("Numerical divergence during optimization")]
    NumericalDivergence,

    /// DB or cache temporarily unavailable (503 for writers)
    #[error("Transient infrastructure error: {0}")]
    Transient(String),

    /// Internal server error (500 Internal Server Error)
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            DomainError::InvalidInput(_) | DomainError::ValidationErrors(_) => {
                StatusCode::BAD_REQUEST
            }
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
            DomainError::DuplicateInFlight => StatusCode::CONFLICT,
            DomainError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            DomainError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::Provider(_)
            | DomainError::NumericalDivergence
            | DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable class name, stored in idempotency records.
    pub fn class(&self) -> &'static str {
        match self {
            DomainError::InvalidInput(_) | DomainError::ValidationErrors(_) => "InvalidInput",
            DomainError::NotFound(_) => "NotFound",
            DomainError::Unauthorized(_) => "Unauthorized",
            DomainError::Forbidden(_) => "Forbidden",
            DomainError::DuplicateInFlight => "DuplicateInFlight",
            DomainError::RateLimited => "RateLimited",
            DomainError::Provider(_) => "ProviderError",
            DomainError::NumericalDivergence => "NumericalDivergence",
            DomainError::Transient(_) => "TransientError",
            DomainError::Internal(_) => "Internal",
        }
    }

    /// Create a validation error from validator errors
    pub fn from_validation_errors(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error
                            .message
                            .as_ref()
                            .unwrap_or(&std::borrow::Cow::Borrowed("validation failed"))
                    )
                })
            })
            .collect();

        if messages.is_empty() {
            DomainError::InvalidInput("Invalid input".to_string())
        } else {
            DomainError::ValidationErrors(messages)
        }
    }
}

/// Implement IntoResponse for DomainError to integrate with Axum
impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal detail never reaches the caller; log it here.
        if matches!(
            self,
            DomainError::Internal(_) | DomainError::Transient(_) | DomainError::Provider(_)
        ) {
            tracing::error!("Internal error: {}", self);
        }

        let body = match &self {
            DomainError::ValidationErrors(details) => ErrorResponse {
                error: "Validation failed".to_string(),
                details: Some(details.clone()),
            },
            DomainError::Internal(_) => ErrorResponse {
                error: "Internal server error".to_string(),
                details: None,
            },
            _ => ErrorResponse {
                error: self.to_string(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mappings() {
        assert_eq!(
            DomainError::InvalidInput("rating".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DomainError::NotFound("card".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DomainError::DuplicateInFlight.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            DomainError::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            DomainError::Transient("db down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_classes_are_stable() {
        assert_eq!(DomainError::DuplicateInFlight.class(), "DuplicateInFlight");
        assert_eq!(DomainError::NumericalDivergence.class(), "NumericalDivergence");
        assert_eq!(DomainError::Transient("x".into()).class(), "TransientError");
    }
}
