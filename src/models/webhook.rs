//! Webhook models for the processor's notification stream.
//!
//! The external processor pushes notification envelopes at-least-once,
//! possibly duplicated and out of order. The envelope itself is treated as
//! untrusted input: only the payment id is taken from it, and the
//! authoritative state is re-fetched from the processor before anything is
//! written to the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

/// Notification envelope pushed by the processor.
///
/// # JSON Example
///
/// ```json
/// {
///   "type": "payment",
///   "action": "payment.updated",
///   "data": { "id": "118834261472" }
/// }
/// ```
///
/// All fields are deserialized as `Option` so a malformed envelope (`{}`,
/// missing `data`) can be rejected with an itemized 400 instead of an opaque
/// serde failure.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub kind: Option<String>,

    pub action: Option<String>,

    pub data: Option<WebhookEventData>,
}

/// `data` portion of the envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    /// Payment id; the processor sends this as a JSON number or a numeric
    /// string depending on the notification version, so both are accepted.
    #[serde(default, deserialize_with = "deserialize_payment_id")]
    pub id: Option<i64>,
}

fn deserialize_payment_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Str(String),
    }

    match Option::<IdRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IdRepr::Num(n)) => Ok(Some(n)),
        Some(IdRepr::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("non-numeric payment id: {s:?}"))),
    }
}

impl WebhookEnvelope {
    /// Reject envelopes missing `type` or `data`; everything else is the
    /// reconciliation service's problem.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.kind.is_none() || self.data.is_none() {
            return Err(AppError::InvalidRequest(
                "Invalid webhook data: missing type or data".to_string(),
            ));
        }
        Ok(())
    }
}

/// Acknowledgment body returned for every accepted envelope.
///
/// The sender retries aggressively on non-success responses, so internal
/// failures are reported here as `processed: false` with a 200 status and
/// surfaced to operators through logs instead.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub processed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl WebhookAck {
    pub fn processed() -> Self {
        Self {
            received: true,
            processed: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            received: true,
            processed: false,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Static capability descriptor for `GET /webhooks/status`.
#[derive(Debug, Serialize)]
pub struct WebhookStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub endpoints: WebhookEndpoints,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct WebhookEndpoints {
    pub processor: &'static str,
}

impl WebhookStatus {
    pub fn current() -> Self {
        Self {
            status: "active",
            service: "payment-intake-webhooks",
            endpoints: WebhookEndpoints {
                processor: "/webhooks/processor",
            },
            timestamp: Utc::now(),
        }
    }
}
