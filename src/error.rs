//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Caller errors**: malformed or incomplete intake requests, malformed
///   webhook envelopes
/// - **Processor errors**: the external processor rejected the charge shape
///   (surfaced with detail) or rejected our credentials (detail withheld)
/// - **Transient I/O**: timeouts and network failures talking to the
///   processor or mail API
/// - **Ledger errors**: any sqlx::Error from database operations
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Intake request is missing one or more required fields.
    ///
    /// Returns HTTP 400 with the exact list of missing field names.
    #[error("Missing required fields: {0:?}")]
    MissingFields(Vec<String>),

    /// Intake email does not look like an address.
    ///
    /// Returns HTTP 400. Checked before any external call.
    #[error("Invalid email format")]
    InvalidEmail(String),

    /// Request body or parameters are invalid (e.g. malformed webhook envelope).
    ///
    /// Returns HTTP 400. The String contains details about what was invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The external processor rejected the charge shape.
    ///
    /// Returns HTTP 400 with the processor's detail passed through.
    #[error("Payment validation failed: {0}")]
    ProcessorValidation(String),

    /// The external processor rejected our credentials.
    ///
    /// Returns HTTP 500 with detail withheld from the caller.
    #[error("Payment service configuration error")]
    ProcessorAuth,

    /// Timeout or network failure talking to the processor or mail API.
    ///
    /// Retryable; returns HTTP 500 with a generic message.
    #[error("Upstream I/O failure: {0}")]
    Transient(String),

    /// Payment id unknown to the processor.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Payment not found")]
    PaymentNotFound,

    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// `MissingFields` additionally carries a `missing` array so the caller can
/// fix its request in one round trip.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Map each error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            // Carries structured detail the generic shape can't hold
            AppError::MissingFields(missing) => {
                let body = Json(json!({
                    "error": {
                        "code": "missing_fields",
                        "message": "Missing required fields",
                        "missing": missing,
                    }
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::InvalidEmail(ref email) => (
                StatusCode::BAD_REQUEST,
                "invalid_email",
                format!("Invalid email format: {email}"),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::ProcessorValidation(ref detail) => (
                StatusCode::BAD_REQUEST,
                "payment_validation_failed",
                detail.clone(),
            ),
            AppError::ProcessorAuth => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "payment_service_configuration_error",
                // Detail deliberately withheld from the caller
                "Invalid credentials".to_string(),
            ),
            AppError::PaymentNotFound => {
                (StatusCode::NOT_FOUND, "payment_not_found", self.to_string())
            }
            AppError::Transient(_) | AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        // Return the response with status code and JSON body
        (status, body).into_response()
    }
}
