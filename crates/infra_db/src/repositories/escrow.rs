//! Escrow account repository

use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::AuthorizationId;
use domain_payment::{EscrowAccount, EscrowRecord};

use crate::error::DatabaseError;
use crate::rows::EscrowRow;

#[derive(Debug, Clone)]
pub struct EscrowRepository {
    pool: PgPool,
}

impl EscrowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or updates the account for its authorization
    ///
    /// One account per authorization; a save after a draw overwrites the
    /// balances and status in place.
    pub async fn save(&self, account: &EscrowAccount) -> Result<(), DatabaseError> {
        let record = EscrowRecord::from(account);
        sqlx::query(
            r#"
            INSERT INTO escrow_accounts (
                id, authorization_id, held_cents, released_cents, refunded_cents,
                currency, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (authorization_id) DO UPDATE SET
                released_cents = EXCLUDED.released_cents,
                refunded_cents = EXCLUDED.refunded_cents,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::from(record.id))
        .bind(Uuid::from(record.authorization_id))
        .bind(record.held.cents())
        .bind(record.released.cents())
        .bind(record.refunded.cents())
        .bind(record.held.currency().code())
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn for_authorization(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Option<EscrowAccount>, DatabaseError> {
        let row = sqlx::query_as::<_, EscrowRow>(
            r#"
            SELECT id, authorization_id, held_cents, released_cents, refunded_cents,
                   currency, status, created_at, updated_at
            FROM escrow_accounts
            WHERE authorization_id = $1
            "#,
        )
        .bind(Uuid::from(authorization_id))
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| EscrowRecord::try_from(r).map(EscrowAccount::from))
            .transpose()
    }
}
