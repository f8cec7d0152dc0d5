//! Ledger transaction repository
//!
//! Append-only: rows are inserted and never updated or deleted.

use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::AuthorizationId;
use domain_payment::LedgerTransaction;

use crate::error::DatabaseError;
use crate::rows::TransactionRow;

#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, txn: &LedgerTransaction) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_transactions (
                id, authorization_id, booking_id, kind, amount_cents, currency,
                status, gateway_reference, failure_reason, created_at, settled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(Uuid::from(txn.id))
        .bind(Uuid::from(txn.authorization_id))
        .bind(Uuid::from(txn.booking_id))
        .bind(txn.kind.as_str())
        .bind(txn.amount.cents())
        .bind(txn.amount.currency().code())
        .bind(txn.status.as_str())
        .bind(&txn.gateway_reference)
        .bind(&txn.failure_reason)
        .bind(txn.created_at)
        .bind(txn.settled_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn for_authorization(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<LedgerTransaction>, DatabaseError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, authorization_id, booking_id, kind, amount_cents, currency,
                   status, gateway_reference, failure_reason, created_at, settled_at
            FROM ledger_transactions
            WHERE authorization_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(Uuid::from(authorization_id))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LedgerTransaction::try_from).collect()
    }
}
