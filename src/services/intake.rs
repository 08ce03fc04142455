//! Payment intake - validates and submits new charge requests.
//!
//! Intake owns the first half of the payment lifecycle: request validation,
//! idempotency-token generation, charge submission to the processor, and the
//! initial ledger write. When the processor captures synchronously (the
//! charge comes back already approved), a confirmation notification is
//! attempted; its failure is logged and never fails the intake response —
//! charge success is never undone by the notification layer.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::ledger::LedgerStore;
use crate::models::payment::{ChargeRequest, Payment, PaymentResponse};
use crate::notify::{Notification, NotificationDispatcher};
use crate::processor::{ChargeOrder, Identification, Payer, ProcessorClient};

/// Fields every charge request must carry.
const REQUIRED_FIELDS: [&str; 4] = ["token", "email", "amount", "customer_name"];

/// The required fields of a [`ChargeRequest`], owned and verified present.
struct ValidCharge {
    token: String,
    email: String,
    amount: rust_decimal::Decimal,
    customer_name: String,
}

/// Process a charge request end to end.
///
/// # Process
///
/// 1. Validate presence of required fields and email shape (before any
///    external call)
/// 2. Generate the `external_reference` idempotency token
/// 3. Build and submit the charge to the processor (bounded timeout)
/// 4. Upsert the ledger row keyed by the processor-returned id
/// 5. If the charge captured synchronously as `approved`, attempt a
///    confirmation notification (best-effort)
pub async fn process_charge(
    ledger: &dyn LedgerStore,
    processor: &dyn ProcessorClient,
    dispatcher: &dyn NotificationDispatcher,
    config: &Config,
    request: ChargeRequest,
) -> Result<PaymentResponse, AppError> {
    let valid = validate(&request)?;

    let external_reference = generate_external_reference();
    tracing::info!(
        email = %valid.email,
        external_reference = %external_reference,
        "payment processing started"
    );

    let order = build_charge_order(&request, &valid, config, external_reference.clone());

    let result = processor.create(&order).await?;
    tracing::info!(
        payment_id = result.id,
        status = %result.status,
        external_reference = %external_reference,
        "charge created at processor"
    );

    let now = Utc::now();
    let payment = Payment {
        id: result.id,
        external_reference: external_reference.clone(),
        status: result.status.clone(),
        status_detail: result.status_detail.clone(),
        amount: result.transaction_amount,
        installments: result.installments,
        payment_method: result.payment_method_id.clone(),
        customer_email: valid.email.clone(),
        customer_name: valid.customer_name.clone(),
        customer_document: request.identification_number.clone(),
        plan: request.plan.clone(),
        metadata: Some(build_metadata(&request, &valid.customer_name)),
        webhook_received: false,
        access_provisioned: false,
        created_at: now,
        updated_at: now,
    };
    ledger.upsert_payment(&payment).await?;

    // Synchronous capture: confirm right away instead of waiting for the
    // webhook. Best-effort only.
    if payment.status == "approved" {
        let notification = Notification::PaymentConfirmation {
            name: valid.customer_name.clone(),
            plan: request.plan.clone(),
            amount: payment.amount,
            payment_id: payment.id,
            external_reference: external_reference.clone(),
        };
        if let Err(e) = dispatcher.send(&valid.email, &notification).await {
            tracing::error!(
                payment_id = payment.id,
                stage = "intake_confirmation",
                error = %e,
                "confirmation dispatch failed"
            );
        }
    }

    Ok(PaymentResponse {
        id: payment.id,
        status: payment.status,
        status_detail: payment.status_detail,
        external_reference,
        payment_method_id: payment.payment_method,
        installments: payment.installments,
        transaction_amount: payment.amount,
        created_at: now,
    })
}

/// Generate the idempotency token for one intake attempt.
///
/// Millisecond timestamp plus a UUIDv4 suffix: unique across rapid
/// successive calls, and readable enough to correlate in processor
/// dashboards.
pub fn generate_external_reference() -> String {
    format!(
        "SUB-{}-{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

fn validate(request: &ChargeRequest) -> Result<ValidCharge, AppError> {
    let mut missing = Vec::new();

    let blank = |s: &Option<String>| s.as_deref().is_none_or(|v| v.trim().is_empty());

    if blank(&request.token) {
        missing.push(REQUIRED_FIELDS[0].to_string());
    }
    if blank(&request.email) {
        missing.push(REQUIRED_FIELDS[1].to_string());
    }
    // A zero amount is treated as absent, matching the checkout widget's contract
    if request.amount.is_none_or(|a| a.is_zero()) {
        missing.push(REQUIRED_FIELDS[2].to_string());
    }
    if blank(&request.customer_name) {
        missing.push(REQUIRED_FIELDS[3].to_string());
    }

    if !missing.is_empty() {
        return Err(AppError::MissingFields(missing));
    }

    let email = request.email.clone().unwrap_or_default();
    if !is_valid_email(&email) {
        return Err(AppError::InvalidEmail(email));
    }

    Ok(ValidCharge {
        token: request.token.clone().unwrap_or_default(),
        email,
        amount: request.amount.unwrap_or_default(),
        customer_name: request.customer_name.clone().unwrap_or_default(),
    })
}

/// Address-shape check: non-empty local part, single `@`, dotted domain,
/// no whitespace anywhere.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

fn build_charge_order(
    request: &ChargeRequest,
    valid: &ValidCharge,
    config: &Config,
    external_reference: String,
) -> ChargeOrder {
    let (first_name, last_name) = split_name(&valid.customer_name);

    // The identification number falls back to a configured default only as
    // a last resort; when neither is present the field is omitted and the
    // processor decides.
    let identification = request
        .identification_number
        .clone()
        .or_else(|| config.default_identification_number.clone())
        .map(|number| Identification {
            kind: request
                .identification_type
                .clone()
                .unwrap_or_else(|| config.default_identification_type.clone()),
            number,
        });

    let description = request.description.clone().unwrap_or_else(|| {
        format!(
            "Subscription - {} plan",
            request.plan.as_deref().unwrap_or("unknown")
        )
    });

    ChargeOrder {
        transaction_amount: valid.amount,
        token: valid.token.clone(),
        description,
        installments: request.installments.unwrap_or(1).max(1),
        payment_method_id: request.payment_method_id.clone(),
        issuer_id: request.issuer_id.clone(),
        payer: Payer {
            email: valid.email.clone(),
            first_name,
            last_name,
            identification,
        },
        metadata: build_metadata(request, &valid.customer_name),
        notification_url: config.notification_url(),
        external_reference,
    }
}

/// Split a full name into first/last. Single-token names reuse the first
/// name as the surname; the processor rejects empty surnames.
fn split_name(full_name: &str) -> (String, String) {
    let mut tokens = full_name.split_whitespace();
    let first = tokens.next().unwrap_or_default().to_string();
    let rest = tokens.collect::<Vec<_>>().join(" ");
    if rest.is_empty() {
        (first.clone(), first)
    } else {
        (first, rest)
    }
}

/// Intake context merged over the caller-supplied metadata blob. Caller keys
/// win on collision.
fn build_metadata(request: &ChargeRequest, customer_name: &str) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert(
        "plan".to_string(),
        json!(request.plan.as_deref().unwrap_or("unknown")),
    );
    map.insert("source".to_string(), json!("checkout"));
    map.insert("customer_name".to_string(), json!(customer_name));
    map.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));

    if let Some(serde_json::Value::Object(extra)) = &request.metadata {
        for (key, value) in extra {
            map.insert(key.clone(), value.clone());
        }
    }

    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::ledger::MockLedgerStore;
    use crate::notify::{MockNotificationDispatcher, NotifyError};
    use crate::processor::{MockProcessorClient, ProcessorPayment};
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn full_request() -> ChargeRequest {
        serde_json::from_value(serde_json::json!({
            "token": "tok_x",
            "email": "jane@example.com",
            "amount": 49.90,
            "customer_name": "Jane Doe",
            "plan": "monthly"
        }))
        .unwrap()
    }

    fn approved_result(order: &ChargeOrder) -> ProcessorPayment {
        ProcessorPayment {
            id: 118834261472,
            status: "approved".to_string(),
            status_detail: Some("accredited".to_string()),
            transaction_amount: order.transaction_amount,
            installments: order.installments,
            payment_method_id: Some("visa".to_string()),
            external_reference: Some(order.external_reference.clone()),
            date_created: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn missing_fields_are_itemized_and_nothing_is_called() {
        // Mocks without expectations panic if touched: no ledger write, no
        // processor call for an incomplete request.
        let ledger = MockLedgerStore::new();
        let processor = MockProcessorClient::new();
        let dispatcher = MockNotificationDispatcher::new();

        let request: ChargeRequest =
            serde_json::from_value(serde_json::json!({ "email": "jane@example.com" })).unwrap();

        let err = process_charge(&ledger, &processor, &dispatcher, &test_config(), request)
            .await
            .unwrap_err();

        match err {
            AppError::MissingFields(missing) => {
                assert_eq!(missing, vec!["token", "amount", "customer_name"]);
            }
            other => panic!("expected MissingFields, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_fields_missing_lists_all_four() {
        let ledger = MockLedgerStore::new();
        let processor = MockProcessorClient::new();
        let dispatcher = MockNotificationDispatcher::new();

        let request: ChargeRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        let err = process_charge(&ledger, &processor, &dispatcher, &test_config(), request)
            .await
            .unwrap_err();

        match err {
            AppError::MissingFields(missing) => {
                assert_eq!(missing, vec!["token", "email", "amount", "customer_name"]);
            }
            other => panic!("expected MissingFields, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_email_is_rejected_before_any_external_call() {
        let ledger = MockLedgerStore::new();
        let processor = MockProcessorClient::new();
        let dispatcher = MockNotificationDispatcher::new();

        let mut request = full_request();
        request.email = Some("not-an-address".to_string());

        let err = process_charge(&ledger, &processor, &dispatcher, &test_config(), request)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidEmail(_)));
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("j.doe+tag@sub.example.co"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane@.com"));
        assert!(!is_valid_email("jane@example.com."));
        assert!(!is_valid_email("jane doe@example.com"));
        assert!(!is_valid_email("jane@ex@ample.com"));
    }

    #[test]
    fn external_references_are_pairwise_distinct_under_rapid_generation() {
        let references: HashSet<String> =
            (0..1000).map(|_| generate_external_reference()).collect();
        assert_eq!(references.len(), 1000);
    }

    #[tokio::test]
    async fn approved_charge_writes_ledger_and_sends_confirmation() {
        let mut ledger = MockLedgerStore::new();
        ledger
            .expect_upsert_payment()
            .withf(|payment| {
                payment.id == 118834261472
                    && payment.status == "approved"
                    && payment.customer_email == "jane@example.com"
                    && payment.amount == dec!(49.90)
                    && !payment.webhook_received
                    && !payment.access_provisioned
                    && payment.external_reference.starts_with("SUB-")
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut processor = MockProcessorClient::new();
        processor
            .expect_create()
            .withf(|order| {
                order.payer.first_name == "Jane"
                    && order.payer.last_name == "Doe"
                    && order.external_reference.starts_with("SUB-")
                    && order.notification_url
                        == "https://backend.example.com/webhooks/processor"
            })
            .times(1)
            .returning(|order| Ok(approved_result(order)));

        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher
            .expect_send()
            .withf(|recipient, notification| {
                recipient == "jane@example.com"
                    && matches!(notification, Notification::PaymentConfirmation { .. })
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let response = process_charge(
            &ledger,
            &processor,
            &dispatcher,
            &test_config(),
            full_request(),
        )
        .await
        .unwrap();

        assert_eq!(response.id, 118834261472);
        assert_eq!(response.status, "approved");
        assert_eq!(response.transaction_amount, dec!(49.90));
        assert!(response.external_reference.starts_with("SUB-"));
    }

    #[tokio::test]
    async fn pending_charge_skips_confirmation() {
        let mut ledger = MockLedgerStore::new();
        ledger.expect_upsert_payment().times(1).returning(|_| Ok(()));

        let mut processor = MockProcessorClient::new();
        processor.expect_create().times(1).returning(|order| {
            Ok(ProcessorPayment {
                status: "pending".to_string(),
                status_detail: Some("pending_contingency".to_string()),
                ..approved_result(order)
            })
        });

        // No expectation: a dispatch attempt would panic
        let dispatcher = MockNotificationDispatcher::new();

        let response = process_charge(
            &ledger,
            &processor,
            &dispatcher,
            &test_config(),
            full_request(),
        )
        .await
        .unwrap();
        assert_eq!(response.status, "pending");
    }

    #[tokio::test]
    async fn confirmation_dispatch_failure_does_not_fail_intake() {
        let mut ledger = MockLedgerStore::new();
        ledger.expect_upsert_payment().times(1).returning(|_| Ok(()));

        let mut processor = MockProcessorClient::new();
        processor
            .expect_create()
            .times(1)
            .returning(|order| Ok(approved_result(order)));

        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher
            .expect_send()
            .times(1)
            .returning(|_, _| Err(NotifyError::NotConfigured));

        let response = process_charge(
            &ledger,
            &processor,
            &dispatcher,
            &test_config(),
            full_request(),
        )
        .await
        .unwrap();
        assert_eq!(response.status, "approved");
    }

    #[tokio::test]
    async fn identification_fallback_is_opt_in() {
        let mut config = test_config();
        // Not configured: identification omitted entirely
        let mut processor = MockProcessorClient::new();
        processor
            .expect_create()
            .withf(|order| order.payer.identification.is_none())
            .times(1)
            .returning(|order| Ok(approved_result(order)));
        let mut ledger = MockLedgerStore::new();
        ledger.expect_upsert_payment().returning(|_| Ok(()));
        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher.expect_send().returning(|_, _| Ok(()));
        process_charge(&ledger, &processor, &dispatcher, &config, full_request())
            .await
            .unwrap();

        // Configured: fallback number with the default type
        config.default_identification_number = Some("19119119100".to_string());
        let mut processor = MockProcessorClient::new();
        processor
            .expect_create()
            .withf(|order| {
                order
                    .payer
                    .identification
                    .as_ref()
                    .is_some_and(|id| id.kind == "CPF" && id.number == "19119119100")
            })
            .times(1)
            .returning(|order| Ok(approved_result(order)));
        let mut ledger = MockLedgerStore::new();
        ledger.expect_upsert_payment().returning(|_| Ok(()));
        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher.expect_send().returning(|_, _| Ok(()));
        process_charge(&ledger, &processor, &dispatcher, &config, full_request())
            .await
            .unwrap();
    }

    #[test]
    fn single_token_name_reuses_first_as_surname() {
        assert_eq!(split_name("Jane Doe"), ("Jane".into(), "Doe".into()));
        assert_eq!(
            split_name("Jane van der Doe"),
            ("Jane".into(), "van der Doe".into())
        );
        assert_eq!(split_name("Jane"), ("Jane".into(), "Jane".into()));
    }

    #[test]
    fn caller_metadata_overlays_intake_context() {
        let mut request = full_request();
        request.metadata = Some(serde_json::json!({ "campaign": "launch", "source": "ads" }));
        let metadata = build_metadata(&request, "Jane Doe");
        assert_eq!(metadata["plan"], "monthly");
        assert_eq!(metadata["campaign"], "launch");
        // Caller keys win on collision
        assert_eq!(metadata["source"], "ads");
    }
}
