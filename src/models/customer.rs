//! Customer data models.

/// Upsert payload written by provisioning when a payment is first approved.
///
/// # Database Table
///
/// Maps onto the `customers` table, keyed for business purposes by the
/// unique `email` column. A customer row is created or updated only by
/// provisioning, which is triggered exclusively by a payment reaching
/// `approved`; the upsert sets `access_granted = true` and overwrites any
/// prior `temp_password`.
///
/// `Payment.customer_email` softly references `customers.email`; there is
/// no enforced foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub email: String,
    pub name: String,
    pub document: Option<String>,
    pub plan: Option<String>,
    pub temp_password: String,
}
