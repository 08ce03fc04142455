//! Notification dispatcher for customer-facing messages.
//!
//! Delivery is best-effort by contract: a payment that charged and landed in
//! the ledger must never be failed (or rolled back) because a notification
//! could not be sent. Callers log dispatch failures with payment context and
//! move on.
//!
//! `HttpMailDispatcher` posts plain-text messages to a configured mail
//! delivery API. HTML template rendering is deliberately out of scope.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::config::Config;

/// Errors from notification dispatch. Always absorbed (logged) by callers.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// No mail API is configured; dispatch is a soft no-op failure.
    #[error("notification service not configured")]
    NotConfigured,

    /// The mail API rejected the message.
    #[error("mail API returned status {0}")]
    Rejected(u16),

    /// Timeout or connection failure talking to the mail API.
    #[error("mail API transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A templated message to a customer. The dispatcher owns the wording; the
/// lifecycle services only choose the kind and supply the facts.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Sent when a charge is approved (including synchronous capture at intake).
    PaymentConfirmation {
        name: String,
        plan: Option<String>,
        amount: Decimal,
        payment_id: i64,
        external_reference: String,
    },

    /// Sent once per provisioning event, carrying the temporary credential.
    AccessCredentials {
        name: String,
        temp_password: String,
        login_url: String,
    },
}

impl Notification {
    fn subject(&self) -> &'static str {
        match self {
            Notification::PaymentConfirmation { .. } => "Purchase confirmed",
            Notification::AccessCredentials { .. } => "Your access credentials",
        }
    }

    fn body(&self, recipient: &str) -> String {
        match self {
            Notification::PaymentConfirmation {
                name,
                plan,
                amount,
                payment_id,
                external_reference,
            } => format!(
                "Hello {name},\n\n\
                 Your purchase has been confirmed.\n\n\
                 Plan: {}\n\
                 Amount: {amount}\n\
                 Transaction: #{payment_id}\n\
                 Reference: {external_reference}\n\n\
                 Your access credentials will follow in a separate message.\n",
                plan.as_deref().unwrap_or("unknown"),
            ),
            Notification::AccessCredentials {
                name,
                temp_password,
                login_url,
            } => format!(
                "Hello {name},\n\n\
                 Here are your access credentials:\n\n\
                 Login: {recipient}\n\
                 Temporary password: {temp_password}\n\
                 URL: {login_url}\n\n\
                 Please change your password after the first login.\n",
            ),
        }
    }
}

/// Seam between the payment lifecycle and message delivery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one message to `recipient`. May fail independently of ledger
    /// state; callers treat failure as logged-and-absorbed.
    async fn send(&self, recipient: &str, notification: &Notification) -> Result<(), NotifyError>;
}

/// Production dispatcher posting JSON to a mail delivery API.
pub struct HttpMailDispatcher {
    http: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
    from: String,
}

impl HttpMailDispatcher {
    /// Mail calls get a tighter bound than processor calls; a slow mail API
    /// must not hold a webhook handler anywhere near the sender's retry window.
    const TIMEOUT_SECS: u64 = 5;

    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(Self::TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            api_url: config.mail_api_url.clone(),
            api_key: config.mail_api_key.clone(),
            from: config
                .mail_from
                .clone()
                .unwrap_or_else(|| "no-reply@example.com".to_string()),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for HttpMailDispatcher {
    async fn send(&self, recipient: &str, notification: &Notification) -> Result<(), NotifyError> {
        let api_url = self.api_url.as_deref().ok_or(NotifyError::NotConfigured)?;

        let mut request = self.http.post(api_url).json(&serde_json::json!({
            "from": self.from,
            "to": recipient,
            "subject": notification.subject(),
            "text": notification.body(recipient),
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }

        tracing::info!(
            recipient,
            subject = notification.subject(),
            "notification accepted by mail API"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn credentials_body_contains_login_and_password() {
        let notification = Notification::AccessCredentials {
            name: "Jane Doe".into(),
            temp_password: "xK3mP9qR".into(),
            login_url: "https://app.example.com".into(),
        };
        let body = notification.body("jane@example.com");
        assert!(body.contains("jane@example.com"));
        assert!(body.contains("xK3mP9qR"));
        assert!(body.contains("https://app.example.com"));
    }

    #[test]
    fn confirmation_body_names_transaction_and_reference() {
        let notification = Notification::PaymentConfirmation {
            name: "Jane Doe".into(),
            plan: Some("monthly".into()),
            amount: dec!(49.90),
            payment_id: 118834261472,
            external_reference: "SUB-1-abc".into(),
        };
        let body = notification.body("jane@example.com");
        assert!(body.contains("#118834261472"));
        assert!(body.contains("SUB-1-abc"));
        assert!(body.contains("monthly"));
    }
}
