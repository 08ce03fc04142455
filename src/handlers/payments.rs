//! Payment HTTP handlers.
//!
//! This module implements payment-related API endpoints:
//! - POST /payments/process - Validate and submit a new charge
//! - GET /payments/status/:id - Live processor-reported status for a payment

use axum::{
    Json,
    extract::{Path, State},
};

use crate::error::AppError;
use crate::models::payment::{ChargeRequest, PaymentResponse, PaymentStatusResponse};
use crate::services::intake;
use crate::state::AppState;

/// Process a new charge.
///
/// # Request Body
///
/// ```json
/// {
///   "token": "tok_x",
///   "email": "jane@example.com",
///   "amount": 49.90,
///   "customer_name": "Jane Doe",
///   "plan": "monthly"
/// }
/// ```
///
/// # Response (200)
///
/// ```json
/// {
///   "id": 118834261472,
///   "status": "approved",
///   "status_detail": "accredited",
///   "external_reference": "SUB-1724700000000-...",
///   "payment_method_id": "visa",
///   "installments": 1,
///   "transaction_amount": 49.9,
///   "created_at": "2026-08-27T12:00:00Z"
/// }
/// ```
///
/// # Errors
///
/// - 400 with an itemized `missing` array for incomplete requests
/// - 400 for a malformed email or a processor-rejected charge shape
/// - 500 (masked) for processor credential problems and transient I/O
pub async fn process_payment(
    State(state): State<AppState>,
    Json(request): Json<ChargeRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    let response = intake::process_charge(
        state.ledger.as_ref(),
        state.processor.as_ref(),
        state.dispatcher.as_ref(),
        &state.config,
        request,
    )
    .await?;

    Ok(Json(response))
}

/// Get the current processor-reported status for a payment id.
///
/// The state is fetched live from the processor rather than read from the
/// ledger, so the caller sees the authority's view even before the next
/// webhook lands.
pub async fn get_payment_status(
    State(state): State<AppState>,
    Path(payment_id): Path<i64>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let fetched = state.processor.get(payment_id).await?;
    Ok(Json(fetched.into()))
}
