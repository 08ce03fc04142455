//! Ledger store - the single source of truth for payment outcomes.
//!
//! The ledger serializes concurrent updates to the same payment id at the
//! database: reconciliation writes are pure overwrites guarded by the
//! terminal-status policy, and the provisioning claim is a row update whose
//! affected-row count decides which of several duplicate webhook deliveries
//! gets to provision. Updates to different payment ids never contend.

use async_trait::async_trait;

use crate::db::DbPool;
use crate::models::customer::NewCustomer;
use crate::models::payment::Payment;
use crate::processor::ProcessorPayment;

/// Result of applying fetched processor state to a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The row was overwritten (or identically re-overwritten).
    Updated,

    /// The row sits in a terminal status and the fetched status differs.
    /// The write was refused; the row is frozen.
    TerminalConflict,

    /// No row for this id yet. A webhook can outrun the intake handler's
    /// initial write, so this is a transient miss, not an error.
    Missing,
}

/// Persistence seam for payments and customers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Write the initial ledger row, keyed by the processor-assigned id.
    /// A second write for the same id updates status fields in place
    /// (upsert-by-primary-key, never a duplicate row).
    async fn upsert_payment(&self, payment: &Payment) -> Result<(), sqlx::Error>;

    async fn get_payment(&self, id: i64) -> Result<Option<Payment>, sqlx::Error>;

    /// Idempotently overwrite a row with freshly fetched processor state:
    /// `status`, `status_detail`, `updated_at`, `webhook_received = true`.
    /// Safe to apply any number of times with the same fetched state.
    async fn apply_processor_state(
        &self,
        fetched: &ProcessorPayment,
    ) -> Result<ReconcileOutcome, sqlx::Error>;

    /// Atomically claim provisioning for `payment_id` and upsert the
    /// customer in the same transaction. Returns `false` without side
    /// effects when a previous delivery already claimed this payment.
    async fn provision_customer(
        &self,
        payment_id: i64,
        customer: &NewCustomer,
    ) -> Result<bool, sqlx::Error>;
}

/// PostgreSQL-backed ledger.
pub struct PgLedger {
    pool: DbPool,
}

impl PgLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn upsert_payment(&self, payment: &Payment) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, external_reference, status, status_detail, amount,
                installments, payment_method, customer_email, customer_name,
                customer_document, plan, metadata, webhook_received,
                access_provisioned, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                status_detail = EXCLUDED.status_detail,
                updated_at = NOW()
            "#,
        )
        .bind(payment.id)
        .bind(&payment.external_reference)
        .bind(&payment.status)
        .bind(&payment.status_detail)
        .bind(payment.amount)
        .bind(payment.installments)
        .bind(&payment.payment_method)
        .bind(&payment.customer_email)
        .bind(&payment.customer_name)
        .bind(&payment.customer_document)
        .bind(&payment.plan)
        .bind(&payment.metadata)
        .bind(payment.webhook_received)
        .bind(payment.access_provisioned)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_payment(&self, id: i64) -> Result<Option<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn apply_processor_state(
        &self,
        fetched: &ProcessorPayment,
    ) -> Result<ReconcileOutcome, sqlx::Error> {
        // Terminal rows only accept a re-application of the same status.
        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                status_detail = $3,
                updated_at = NOW(),
                webhook_received = TRUE
            WHERE id = $1
              AND (status = $2 OR status NOT IN ('approved', 'rejected', 'cancelled'))
            "#,
        )
        .bind(fetched.id)
        .bind(&fetched.status)
        .bind(&fetched.status_detail)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated > 0 {
            return Ok(ReconcileOutcome::Updated);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM payments WHERE id = $1)")
            .bind(fetched.id)
            .fetch_one(&self.pool)
            .await?;

        if exists {
            Ok(ReconcileOutcome::TerminalConflict)
        } else {
            Ok(ReconcileOutcome::Missing)
        }
    }

    async fn provision_customer(
        &self,
        payment_id: i64,
        customer: &NewCustomer,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Claim: the first delivery to flip the flag wins; concurrent
        // duplicates serialize on the row lock and see zero rows affected.
        let claimed = sqlx::query(
            r#"
            UPDATE payments
            SET access_provisioned = TRUE,
                updated_at = NOW()
            WHERE id = $1 AND access_provisioned = FALSE
            "#,
        )
        .bind(payment_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO customers (
                email, name, document, plan, status,
                access_granted, temp_password, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'active', TRUE, $5, NOW(), NOW())
            ON CONFLICT (email) DO UPDATE SET
                name = EXCLUDED.name,
                document = COALESCE(EXCLUDED.document, customers.document),
                plan = EXCLUDED.plan,
                status = 'active',
                access_granted = TRUE,
                temp_password = EXCLUDED.temp_password,
                updated_at = NOW()
            "#,
        )
        .bind(&customer.email)
        .bind(&customer.name)
        .bind(&customer.document)
        .bind(&customer.plan)
        .bind(&customer.temp_password)
        .execute(&mut *tx)
        .await?;

        // Claim and customer write commit together
        tx.commit().await?;

        Ok(true)
    }
}
