//! HTTP handlers for the processor's notification stream.
//!
//! - POST /webhooks/processor - Receive a payment notification envelope
//! - GET /webhooks/status - Static capability descriptor
//!
//! # Response policy
//!
//! Once an envelope has been accepted, the handler always acknowledges with
//! HTTP 200, reporting internal failures only as `processed: false`. The
//! processor retries aggressively on non-success responses; surfacing an
//! internal error as a delivery failure would cause a redelivery storm
//! without fixing anything. The companion mechanism is the `payment_alerts`
//! log target, which carries every absorbed failure with payment id and
//! stage.

use axum::{Json, extract::State};

use crate::error::AppError;
use crate::models::webhook::{WebhookAck, WebhookEnvelope, WebhookStatus};
use crate::services::reconcile;
use crate::state::AppState;

/// Receive one notification envelope from the processor.
///
/// # Request Body
///
/// ```json
/// { "type": "payment", "action": "payment.updated", "data": { "id": "118834261472" } }
/// ```
///
/// # Responses
///
/// - 400 for a malformed envelope (missing `type`/`data`, or a payment
///   notification without an id)
/// - 200 `{ "received": true, "processed": true|false, ... }` otherwise
pub async fn processor_webhook(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<WebhookAck>, AppError> {
    // The body is parsed leniently so malformed envelopes become an
    // itemized 400 instead of an extractor rejection
    let envelope: WebhookEnvelope = serde_json::from_value(body)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid webhook data: {e}")))?;
    envelope.validate()?;

    let kind = envelope.kind.as_deref().unwrap_or_default();
    tracing::info!(
        kind,
        action = envelope.action.as_deref().unwrap_or(""),
        "webhook received"
    );

    if kind != "payment" {
        // Acknowledge unrelated notification types without side effects
        tracing::info!(kind, "non-payment webhook type, acknowledging");
        return Ok(Json(WebhookAck::processed()));
    }

    let payment_id = envelope
        .data
        .as_ref()
        .and_then(|d| d.id)
        .ok_or_else(|| AppError::InvalidRequest("Missing payment ID".to_string()))?;

    let result = reconcile::process_payment_notification(
        state.ledger.as_ref(),
        state.processor.as_ref(),
        state.dispatcher.as_ref(),
        &state.config.system_url,
        payment_id,
    )
    .await;

    match result {
        Ok(()) => Ok(Json(WebhookAck::processed())),
        Err(e) => {
            // Absorbed by policy; operators watch this target
            tracing::error!(
                target: "payment_alerts",
                payment_id,
                stage = "webhook_reconciliation",
                error = %e,
                "webhook processing failed, acknowledging anyway"
            );
            Ok(Json(WebhookAck::failed(e.to_string())))
        }
    }
}

/// Static capability descriptor for monitoring and processor onboarding.
pub async fn webhook_status() -> Json<WebhookStatus> {
    Json(WebhookStatus::current())
}
