//! Append-only event log repository

use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::AuthorizationId;
use domain_payment::EventRecord;

use crate::error::DatabaseError;
use crate::rows::EventRow;

/// Events are never updated or deleted; the table is the audit trail.
#[derive(Debug, Clone)]
pub struct EventLogRepository {
    pool: PgPool,
}

impl EventLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, event: &EventRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO payment_events (
                id, authorization_id, booking_id, kind, actor_id, payload, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::from(event.id))
        .bind(Uuid::from(event.authorization_id))
        .bind(Uuid::from(event.booking_id))
        .bind(event.kind.as_str())
        .bind(event.actor_id.map(Uuid::from))
        .bind(&event.payload)
        .bind(event.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Full history for one authorization, oldest first
    pub async fn timeline(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<EventRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, authorization_id, booking_id, kind, actor_id, payload, recorded_at
            FROM payment_events
            WHERE authorization_id = $1
            ORDER BY recorded_at, id
            "#,
        )
        .bind(Uuid::from(authorization_id))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EventRecord::try_from).collect()
    }
}
