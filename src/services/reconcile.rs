//! Webhook reconciliation - brings the ledger into agreement with the
//! processor's authoritative state for one payment id.
//!
//! Notifications arrive at-least-once, duplicated and out of order, and
//! their bodies are untrusted: the only thing taken from an envelope is the
//! payment id. The authoritative state is always re-fetched from the
//! processor before any ledger write, which guards against both stale and
//! forged deliveries.
//!
//! Every write here is an idempotent overwrite, and provisioning is invoked
//! behind the ledger's claim, so redelivering the same notification any
//! number of times converges to the same ledger and exactly one access
//! grant.

use crate::error::AppError;
use crate::ledger::{LedgerStore, ReconcileOutcome};
use crate::notify::NotificationDispatcher;
use crate::processor::ProcessorClient;
use crate::services::provisioning;

/// Reconcile one payment notification.
///
/// Errors returned here are logged and converted into a `processed: false`
/// acknowledgment by the webhook handler; they are never surfaced to the
/// sender as a failure status.
pub async fn process_payment_notification(
    ledger: &dyn LedgerStore,
    processor: &dyn ProcessorClient,
    dispatcher: &dyn NotificationDispatcher,
    login_url: &str,
    payment_id: i64,
) -> Result<(), AppError> {
    // Re-fetch truth; the notification body's own status fields are never
    // acted upon.
    let fetched = processor.get(payment_id).await?;
    tracing::info!(
        payment_id,
        status = %fetched.status,
        status_detail = fetched.status_detail.as_deref().unwrap_or(""),
        "fetched authoritative payment state"
    );

    match ledger.apply_processor_state(&fetched).await? {
        ReconcileOutcome::Updated => {}
        ReconcileOutcome::Missing => {
            // A webhook can outrun the intake handler's initial write.
            // Acknowledge and let the redelivery find the row.
            tracing::warn!(
                payment_id,
                stage = "reconcile_update",
                "ledger row not present yet, acknowledging transient miss"
            );
            return Ok(());
        }
        ReconcileOutcome::TerminalConflict => {
            tracing::warn!(
                payment_id,
                fetched_status = %fetched.status,
                stage = "reconcile_update",
                "refusing to move payment out of terminal status"
            );
            return Ok(());
        }
    }

    match fetched.status.as_str() {
        "approved" => {
            let Some(payment) = ledger.get_payment(payment_id).await? else {
                tracing::warn!(
                    payment_id,
                    stage = "provisioning_lookup",
                    "payment row vanished between update and provisioning"
                );
                return Ok(());
            };
            provisioning::grant_access(ledger, dispatcher, login_url, &payment).await?;
        }
        "rejected" => {
            tracing::info!(
                payment_id,
                status_detail = fetched.status_detail.as_deref().unwrap_or(""),
                "payment rejected"
            );
        }
        "pending" | "in_process" => {
            tracing::info!(payment_id, status = %fetched.status, "payment still pending");
        }
        other => {
            tracing::info!(payment_id, status = %other, "ledger updated, no side effects");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MockLedgerStore;
    use crate::notify::MockNotificationDispatcher;
    use crate::processor::{MockProcessorClient, ProcessorError, ProcessorPayment};
    use crate::services::provisioning::tests::approved_payment;
    use chrono::Utc;
    use mockall::Sequence;
    use rust_decimal_macros::dec;

    const PAYMENT_ID: i64 = 118834261472;
    const LOGIN_URL: &str = "https://app.example.com";

    fn fetched(status: &str) -> ProcessorPayment {
        ProcessorPayment {
            id: PAYMENT_ID,
            status: status.to_string(),
            status_detail: Some(format!("{status}_detail")),
            transaction_amount: dec!(49.90),
            installments: 1,
            payment_method_id: Some("visa".to_string()),
            external_reference: Some("SUB-1724700000000-abc".to_string()),
            date_created: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn approved_state_updates_ledger_and_provisions_once() {
        let mut processor = MockProcessorClient::new();
        processor
            .expect_get()
            .times(1)
            .returning(|_| Ok(fetched("approved")));

        let mut ledger = MockLedgerStore::new();
        ledger
            .expect_apply_processor_state()
            .withf(|f| f.id == PAYMENT_ID && f.status == "approved")
            .times(1)
            .returning(|_| Ok(ReconcileOutcome::Updated));
        ledger
            .expect_get_payment()
            .times(1)
            .returning(|_| Ok(Some(approved_payment())));
        ledger
            .expect_provision_customer()
            .withf(|_, customer| {
                customer.email == "jane@example.com" && !customer.temp_password.is_empty()
            })
            .times(1)
            .returning(|_, _| Ok(true));

        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher.expect_send().times(1).returning(|_, _| Ok(()));

        process_payment_notification(&ledger, &processor, &dispatcher, LOGIN_URL, PAYMENT_ID)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_approved_deliveries_provision_exactly_once() {
        let mut processor = MockProcessorClient::new();
        processor
            .expect_get()
            .times(2)
            .returning(|_| Ok(fetched("approved")));

        let mut ledger = MockLedgerStore::new();
        // Re-applying the same fetched state is a plain overwrite both times
        ledger
            .expect_apply_processor_state()
            .times(2)
            .returning(|_| Ok(ReconcileOutcome::Updated));
        ledger
            .expect_get_payment()
            .times(2)
            .returning(|_| Ok(Some(approved_payment())));

        // First delivery claims; the second loses the claim and must not
        // re-provision
        let mut seq = Sequence::new();
        ledger
            .expect_provision_customer()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(true));
        ledger
            .expect_provision_customer()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(false));

        // Exactly one credential dispatch across both deliveries
        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher.expect_send().times(1).returning(|_, _| Ok(()));

        for _ in 0..2 {
            process_payment_notification(&ledger, &processor, &dispatcher, LOGIN_URL, PAYMENT_ID)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn rejected_state_updates_ledger_without_provisioning() {
        let mut processor = MockProcessorClient::new();
        processor
            .expect_get()
            .times(1)
            .returning(|_| Ok(fetched("rejected")));

        let mut ledger = MockLedgerStore::new();
        ledger
            .expect_apply_processor_state()
            .withf(|f| f.status == "rejected" && f.status_detail.as_deref() == Some("rejected_detail"))
            .times(1)
            .returning(|_| Ok(ReconcileOutcome::Updated));
        // No get_payment / provision_customer expectations: any call panics

        let dispatcher = MockNotificationDispatcher::new();

        process_payment_notification(&ledger, &processor, &dispatcher, LOGIN_URL, PAYMENT_ID)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_ledger_row_is_a_tolerated_transient_miss() {
        let mut processor = MockProcessorClient::new();
        processor
            .expect_get()
            .times(1)
            .returning(|_| Ok(fetched("approved")));

        let mut ledger = MockLedgerStore::new();
        ledger
            .expect_apply_processor_state()
            .times(1)
            .returning(|_| Ok(ReconcileOutcome::Missing));

        let dispatcher = MockNotificationDispatcher::new();

        // No error, no provisioning: the redelivery will find the row
        process_payment_notification(&ledger, &processor, &dispatcher, LOGIN_URL, PAYMENT_ID)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn terminal_conflict_is_a_logged_no_op() {
        let mut processor = MockProcessorClient::new();
        processor
            .expect_get()
            .times(1)
            .returning(|_| Ok(fetched("cancelled")));

        let mut ledger = MockLedgerStore::new();
        ledger
            .expect_apply_processor_state()
            .times(1)
            .returning(|_| Ok(ReconcileOutcome::TerminalConflict));

        let dispatcher = MockNotificationDispatcher::new();

        process_payment_notification(&ledger, &processor, &dispatcher, LOGIN_URL, PAYMENT_ID)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn processor_fetch_failure_propagates_for_logging() {
        let mut processor = MockProcessorClient::new();
        processor
            .expect_get()
            .times(1)
            .returning(|_| Err(ProcessorError::Timeout));

        let ledger = MockLedgerStore::new();
        let dispatcher = MockNotificationDispatcher::new();

        let err =
            process_payment_notification(&ledger, &processor, &dispatcher, LOGIN_URL, PAYMENT_ID)
                .await
                .unwrap_err();
        assert!(matches!(err, AppError::Transient(_)));
    }
}
