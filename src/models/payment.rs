//! Payment data models and API request/response types.
//!
//! This module defines:
//! - `Payment`: ledger entity for one charge attempt and its outcome
//! - `ChargeRequest`: intake request body
//! - `PaymentResponse` / `PaymentStatusResponse`: response bodies returned to clients

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::processor::ProcessorPayment;

/// Represents a payment record from the ledger.
///
/// # Database Table
///
/// Maps to the `payments` table. Each row:
/// - Is keyed by the processor-assigned `id` (write-once; later writes for
///   the same id are updates, not new rows)
/// - Carries the locally generated `external_reference` idempotency token
/// - Snapshots the customer identity at time of charge
/// - Tracks reconciliation (`webhook_received`) and provisioning
///   (`access_provisioned`) progress
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Payment {
    /// Authoritative identifier assigned by the external processor
    pub id: i64,

    /// Locally generated idempotency token, unique per intake attempt
    pub external_reference: String,

    /// Processor-defined status (pending, in_process, approved, rejected,
    /// cancelled, refunded); treated as an opaque string by the ledger
    pub status: String,

    /// Free-form reason string from the processor
    pub status_detail: Option<String>,

    /// Charge amount as a decimal currency value (never a float)
    pub amount: Decimal,

    pub installments: i32,
    pub payment_method: Option<String>,

    /// Customer identity snapshot, denormalized at time of charge
    pub customer_email: String,
    pub customer_name: String,
    pub customer_document: Option<String>,

    pub plan: Option<String>,

    /// Opaque intake-supplied blob, merged with intake context
    pub metadata: Option<serde_json::Value>,

    /// True once the first reconciliation write has landed
    pub webhook_received: bool,

    /// Provisioning claim: flipped false -> true exactly once, inside the
    /// provisioning transaction
    pub access_provisioned: bool,

    pub created_at: DateTime<Utc>,

    /// Advances on every reconciliation write
    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /payments/process`.
///
/// # JSON Example
///
/// ```json
/// {
///   "token": "tok_x",
///   "email": "jane@example.com",
///   "amount": 49.90,
///   "customer_name": "Jane Doe",
///   "installments": 1,
///   "paymentMethodId": "visa",
///   "plan": "monthly"
/// }
/// ```
///
/// # Validation
///
/// `token`, `email`, `amount` and `customer_name` are required; the error
/// for an incomplete request lists exactly the missing names, so all four
/// are deserialized as `Option` and checked by the intake service. The
/// camelCase aliases match the checkout widget's wire format.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeRequest {
    pub token: Option<String>,
    pub email: Option<String>,
    pub amount: Option<Decimal>,
    pub customer_name: Option<String>,

    pub installments: Option<i32>,

    #[serde(rename = "paymentMethodId")]
    pub payment_method_id: Option<String>,

    #[serde(rename = "issuerId")]
    pub issuer_id: Option<String>,

    #[serde(rename = "identificationNumber")]
    pub identification_number: Option<String>,

    #[serde(rename = "identificationType")]
    pub identification_type: Option<String>,

    pub description: Option<String>,
    pub plan: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Response returned for a processed charge.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": 118834261472,
///   "status": "approved",
///   "status_detail": "accredited",
///   "external_reference": "SUB-1724700000000-9f8a...",
///   "payment_method_id": "visa",
///   "installments": 1,
///   "transaction_amount": 49.9,
///   "created_at": "2026-08-27T12:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: i64,
    pub status: String,
    pub status_detail: Option<String>,
    pub external_reference: String,
    pub payment_method_id: Option<String>,
    pub installments: i32,
    pub transaction_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Response for `GET /payments/status/{id}`: the processor-reported state,
/// fetched live rather than read from the ledger.
#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub id: i64,
    pub status: String,
    pub status_detail: Option<String>,
    pub external_reference: Option<String>,
    pub transaction_amount: Decimal,
    pub date_created: Option<DateTime<Utc>>,
}

impl From<ProcessorPayment> for PaymentStatusResponse {
    fn from(p: ProcessorPayment) -> Self {
        Self {
            id: p.id,
            status: p.status,
            status_detail: p.status_detail,
            external_reference: p.external_reference,
            transaction_amount: p.transaction_amount,
            date_created: p.date_created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn charge_request_accepts_camel_case_aliases() {
        let request: ChargeRequest = serde_json::from_value(serde_json::json!({
            "token": "tok_x",
            "email": "jane@example.com",
            "amount": 49.90,
            "customer_name": "Jane Doe",
            "paymentMethodId": "visa",
            "issuerId": "310",
            "identificationNumber": "19119119100",
            "identificationType": "CPF"
        }))
        .unwrap();

        assert_eq!(request.amount, Some(dec!(49.90)));
        assert_eq!(request.payment_method_id.as_deref(), Some("visa"));
        assert_eq!(request.issuer_id.as_deref(), Some("310"));
        assert_eq!(request.identification_type.as_deref(), Some("CPF"));
    }

    #[test]
    fn charge_request_tolerates_missing_required_fields() {
        // Presence is enforced by the intake service, not by serde, so the
        // handler can itemize what is missing.
        let request: ChargeRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(request.token.is_none());
        assert!(request.email.is_none());
        assert!(request.amount.is_none());
        assert!(request.customer_name.is_none());
    }
}
