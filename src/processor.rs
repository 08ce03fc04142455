//! Client for the external payment processor.
//!
//! The processor is the service of record for charge authorization: charges
//! are created here, and reconciliation re-fetches payment state from here
//! instead of trusting notification bodies.
//!
//! The `ProcessorClient` trait is the seam the rest of the system depends
//! on; `HttpProcessorClient` is the production implementation. All calls are
//! bounded by a fixed client-level timeout (default 10s) so a stalled
//! processor surfaces as a retryable error instead of a hung handler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::AppError;

/// Errors from the processor client, classified for the intake error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The processor rejected the charge shape (its 4xx validation family).
    #[error("processor rejected the charge: {0}")]
    Validation(String),

    /// The processor rejected our credentials. Detail is withheld from callers.
    #[error("processor rejected credentials")]
    Auth,

    /// The bounded call timeout elapsed. Retryable.
    #[error("processor request timed out")]
    Timeout,

    /// The processor does not know this payment id.
    #[error("payment {0} not found at processor")]
    NotFound(i64),

    /// Any other non-success response.
    #[error("processor returned unexpected status {status}: {body}")]
    Unexpected { status: u16, body: String },

    /// Connection-level failure (DNS, TLS, reset). Retryable.
    #[error("processor transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<ProcessorError> for AppError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::Validation(detail) => AppError::ProcessorValidation(detail),
            ProcessorError::Auth => AppError::ProcessorAuth,
            ProcessorError::NotFound(_) => AppError::PaymentNotFound,
            ProcessorError::Timeout
            | ProcessorError::Unexpected { .. }
            | ProcessorError::Transport(_) => AppError::Transient(err.to_string()),
        }
    }
}

/// Charge creation request sent to the processor.
///
/// `external_reference` doubles as the idempotency token: it is carried in
/// the body and in the `X-Idempotency-Key` header, so a retried submission
/// cannot double-charge.
#[derive(Debug, Clone, Serialize)]
pub struct ChargeOrder {
    pub transaction_amount: Decimal,
    pub token: String,
    pub description: String,
    pub installments: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_id: Option<String>,

    pub payer: Payer,
    pub metadata: serde_json::Value,
    pub notification_url: String,
    pub external_reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Payer {
    pub email: String,
    pub first_name: String,
    pub last_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub identification: Option<Identification>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Identification {
    #[serde(rename = "type")]
    pub kind: String,
    pub number: String,
}

/// Authoritative payment state as reported by the processor.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorPayment {
    pub id: i64,
    pub status: String,
    pub status_detail: Option<String>,
    pub transaction_amount: Decimal,

    #[serde(default = "default_installments")]
    pub installments: i32,

    pub payment_method_id: Option<String>,
    pub external_reference: Option<String>,
    pub date_created: Option<DateTime<Utc>>,
}

fn default_installments() -> i32 {
    1
}

/// Seam between the payment lifecycle and the external processor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessorClient: Send + Sync {
    /// Submit a new charge. The processor assigns the authoritative id.
    async fn create(&self, charge: &ChargeOrder) -> Result<ProcessorPayment, ProcessorError>;

    /// Fetch the authoritative state for a payment id.
    async fn get(&self, id: i64) -> Result<ProcessorPayment, ProcessorError>;
}

/// Production implementation backed by the processor's REST API.
pub struct HttpProcessorClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpProcessorClient {
    /// Build a client with the configured fixed timeout.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.processor_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.processor_base_url.trim_end_matches('/').to_string(),
            access_token: config.processor_access_token.clone(),
        })
    }

    fn payments_url(&self) -> String {
        format!("{}/v1/payments", self.base_url)
    }

    async fn decode(
        response: reqwest::Response,
        id_hint: Option<i64>,
    ) -> Result<ProcessorPayment, ProcessorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<ProcessorPayment>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status.as_u16(), &body, id_hint))
    }
}

/// Map a processor error response to the taxonomy.
///
/// The processor reports validation failures with a JSON `message`; that is
/// passed through to the caller. Credential failures are classified so the
/// surface can mask the detail.
fn classify_failure(status: u16, body: &str, id_hint: Option<i64>) -> ProcessorError {
    match status {
        400 | 422 => ProcessorError::Validation(extract_message(body)),
        401 | 403 => ProcessorError::Auth,
        404 => match id_hint {
            Some(id) => ProcessorError::NotFound(id),
            None => ProcessorError::Unexpected {
                status,
                body: extract_message(body),
            },
        },
        _ => ProcessorError::Unexpected {
            status,
            body: extract_message(body),
        },
    }
}

fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ProcessorClient for HttpProcessorClient {
    async fn create(&self, charge: &ChargeOrder) -> Result<ProcessorPayment, ProcessorError> {
        let response = self
            .http
            .post(self.payments_url())
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", &charge.external_reference)
            .json(charge)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProcessorError::Timeout
                } else {
                    ProcessorError::Transport(e)
                }
            })?;

        Self::decode(response, None).await
    }

    async fn get(&self, id: i64) -> Result<ProcessorPayment, ProcessorError> {
        let response = self
            .http
            .get(format!("{}/{}", self.payments_url(), id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProcessorError::Timeout
                } else {
                    ProcessorError::Transport(e)
                }
            })?;

        Self::decode(response, Some(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn validation_failure_passes_processor_message_through() {
        let err = classify_failure(400, r#"{"message":"invalid card token"}"#, None);
        match err {
            ProcessorError::Validation(detail) => assert_eq!(detail, "invalid card token"),
            other => panic!("expected Validation, got {other:?}"),
        }
        match AppError::from(classify_failure(400, r#"{"message":"bad"}"#, None)) {
            AppError::ProcessorValidation(detail) => assert_eq!(detail, "bad"),
            other => panic!("expected ProcessorValidation, got {other:?}"),
        }
    }

    #[test]
    fn auth_failure_is_masked() {
        assert!(matches!(classify_failure(401, "", None), ProcessorError::Auth));
        assert!(matches!(
            AppError::from(ProcessorError::Auth),
            AppError::ProcessorAuth
        ));
    }

    #[test]
    fn not_found_maps_by_endpoint() {
        assert!(matches!(
            classify_failure(404, "", Some(42)),
            ProcessorError::NotFound(42)
        ));
        // A 404 from charge creation is not a missing payment
        assert!(matches!(
            classify_failure(404, "", None),
            ProcessorError::Unexpected { status: 404, .. }
        ));
    }

    #[test]
    fn timeout_is_transient() {
        assert!(matches!(
            AppError::from(ProcessorError::Timeout),
            AppError::Transient(_)
        ));
    }

    #[test]
    fn processor_payment_deserializes_wire_shape() {
        let payment: ProcessorPayment = serde_json::from_value(serde_json::json!({
            "id": 118834261472i64,
            "status": "approved",
            "status_detail": "accredited",
            "transaction_amount": 49.90,
            "installments": 1,
            "payment_method_id": "visa",
            "external_reference": "SUB-1-abc",
            "date_created": "2026-08-27T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(payment.id, 118834261472);
        assert_eq!(payment.status, "approved");
        assert_eq!(payment.transaction_amount, dec!(49.90));
    }

    #[test]
    fn installments_default_when_absent() {
        let payment: ProcessorPayment = serde_json::from_value(serde_json::json!({
            "id": 1,
            "status": "pending",
            "transaction_amount": 10.0
        }))
        .unwrap();
        assert_eq!(payment.installments, 1);
    }

    #[test]
    fn charge_order_omits_absent_optionals() {
        let order = ChargeOrder {
            transaction_amount: dec!(49.90),
            token: "tok_x".into(),
            description: "Subscription - monthly plan".into(),
            installments: 1,
            payment_method_id: None,
            issuer_id: None,
            payer: Payer {
                email: "jane@example.com".into(),
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                identification: None,
            },
            metadata: serde_json::json!({}),
            notification_url: "https://backend.example.com/webhooks/processor".into(),
            external_reference: "SUB-1-abc".into(),
        };

        let json = serde_json::to_value(&order).unwrap();
        assert!(json.get("payment_method_id").is_none());
        assert!(json.get("issuer_id").is_none());
        assert!(json["payer"].get("identification").is_none());
        assert_eq!(json["external_reference"], "SUB-1-abc");
    }
}
