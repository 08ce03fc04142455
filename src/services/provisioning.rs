//! Customer provisioning - exactly one access grant per approved payment.
//!
//! The at-most-once guarantee lives in the ledger's transactional claim
//! (`provision_customer`): the first caller for a payment id flips the claim
//! and upserts the customer in one transaction, every later caller gets
//! `false` back and does nothing. Credential delivery runs after the commit
//! and is best-effort; "access granted, notification not yet delivered" is a
//! valid transient state and never rolls the grant back.

use rand::Rng;

use crate::error::AppError;
use crate::ledger::LedgerStore;
use crate::models::customer::NewCustomer;
use crate::models::payment::Payment;
use crate::notify::{Notification, NotificationDispatcher};

/// Visually ambiguous characters (0/O, 1/I/l) are excluded so a credential
/// read over the phone survives transcription.
const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";
const PASSWORD_LEN: usize = 8;

/// Generate a temporary credential from a cryptographically strong source.
///
/// `rand::rng()` is a ChaCha-based CSPRNG reseeded from the OS.
pub fn generate_temp_password() -> String {
    let mut rng = rand::rng();
    (0..PASSWORD_LEN)
        .map(|_| PASSWORD_ALPHABET[rng.random_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}

/// Grant access for an approved payment.
///
/// Returns `true` when this call performed the grant, `false` when a
/// previous delivery already had. Callers may invoke this any number of
/// times per payment; the ledger claim enforces at-most-once effects.
pub async fn grant_access(
    ledger: &dyn LedgerStore,
    dispatcher: &dyn NotificationDispatcher,
    login_url: &str,
    payment: &Payment,
) -> Result<bool, AppError> {
    let temp_password = generate_temp_password();
    let customer = NewCustomer {
        email: payment.customer_email.clone(),
        name: payment.customer_name.clone(),
        document: payment.customer_document.clone(),
        plan: payment.plan.clone(),
        temp_password: temp_password.clone(),
    };

    let claimed = ledger.provision_customer(payment.id, &customer).await?;
    if !claimed {
        tracing::info!(
            payment_id = payment.id,
            "provisioning already completed for this payment, skipping"
        );
        return Ok(false);
    }

    tracing::info!(
        payment_id = payment.id,
        customer_email = %payment.customer_email,
        "access granted"
    );

    let notification = Notification::AccessCredentials {
        name: payment.customer_name.clone(),
        temp_password,
        login_url: login_url.to_string(),
    };
    if let Err(e) = dispatcher.send(&payment.customer_email, &notification).await {
        // The grant stands; delivery is retried out of band, not here
        tracing::error!(
            target: "payment_alerts",
            payment_id = payment.id,
            stage = "credentials_dispatch",
            error = %e,
            "credential delivery failed, access remains granted"
        );
    }

    Ok(true)
}
