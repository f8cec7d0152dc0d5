//! Authorization repository
//!
//! The one-active-per-booking rule lives in the database as a partial
//! unique index over non-terminal statuses, so concurrent inserts
//! cannot race past the application check. Writes are versioned: an
//! UPDATE guarded by `version = $n` matching zero rows means a
//! concurrent writer won.

use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{AuthorizationId, BookingId, TripId};
use domain_payment::{AuthorizationRecord, AuthorizationStatus, PaymentAuthorization};

use crate::error::DatabaseError;
use crate::rows::AuthorizationRow;

const SELECT_COLUMNS: &str = r#"
    SELECT id, booking_id, trip_id, payer_id, traveler_id, gateway_handle,
           destination_account, amount_cents, currency, platform_fee_cents,
           status, confirm_by, expires_at, auto_capture_at, departure_at,
           capture_reason, capture_attempts, last_error, delivery_code,
           confirmed_at, captured_at, cancelled_at, version, created_at,
           updated_at
    FROM payment_authorizations
"#;

#[derive(Debug, Clone)]
pub struct AuthorizationRepository {
    pool: PgPool,
}

impl AuthorizationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new authorization
    ///
    /// A second non-terminal authorization for the same booking violates
    /// the partial unique index and comes back as `DuplicateEntry`.
    pub async fn insert(&self, auth: &PaymentAuthorization) -> Result<(), DatabaseError> {
        let record = AuthorizationRecord::from(auth);
        sqlx::query(
            r#"
            INSERT INTO payment_authorizations (
                id, booking_id, trip_id, payer_id, traveler_id, gateway_handle,
                destination_account, amount_cents, currency, platform_fee_cents,
                status, confirm_by, expires_at, auto_capture_at, departure_at,
                capture_reason, capture_attempts, last_error, delivery_code,
                confirmed_at, captured_at, cancelled_at, version, created_at,
                updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25
            )
            "#,
        )
        .bind(Uuid::from(record.id))
        .bind(Uuid::from(record.booking_id))
        .bind(Uuid::from(record.trip_id))
        .bind(Uuid::from(record.payer_id))
        .bind(Uuid::from(record.traveler_id))
        .bind(&record.gateway_handle)
        .bind(&record.destination_account)
        .bind(record.amount.cents())
        .bind(record.amount.currency().code())
        .bind(record.platform_fee.cents())
        .bind(record.status.as_str())
        .bind(record.confirm_by)
        .bind(record.expires_at)
        .bind(record.auto_capture_at)
        .bind(record.departure_at)
        .bind(&record.capture_reason)
        .bind(record.capture_attempts as i32)
        .bind(&record.last_error)
        .bind(&record.delivery_code)
        .bind(record.confirmed_at)
        .bind(record.captured_at)
        .bind(record.cancelled_at)
        .bind(record.version as i32)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch(
        &self,
        id: AuthorizationId,
    ) -> Result<Option<PaymentAuthorization>, DatabaseError> {
        let row = sqlx::query_as::<_, AuthorizationRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(PaymentAuthorization::try_from).transpose()
    }

    /// The booking's live authorization, if one exists
    pub async fn fetch_active_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<PaymentAuthorization>, DatabaseError> {
        let row = sqlx::query_as::<_, AuthorizationRow>(&format!(
            "{SELECT_COLUMNS} WHERE booking_id = $1 AND status NOT IN ('captured', 'cancelled', 'expired')"
        ))
        .bind(Uuid::from(booking_id))
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentAuthorization::try_from).transpose()
    }

    /// Versioned write-back
    ///
    /// `loaded_version` is the version the caller read before mutating;
    /// zero matched rows means the row moved on and the write is stale.
    pub async fn update_versioned(
        &self,
        auth: &PaymentAuthorization,
        loaded_version: u32,
    ) -> Result<(), DatabaseError> {
        let record = AuthorizationRecord::from(auth);
        let result = sqlx::query(
            r#"
            UPDATE payment_authorizations SET
                gateway_handle = $1, destination_account = $2, status = $3,
                expires_at = $4, auto_capture_at = $5, capture_reason = $6,
                capture_attempts = $7, last_error = $8, delivery_code = $9,
                confirmed_at = $10, captured_at = $11, cancelled_at = $12,
                version = $13, updated_at = $14
            WHERE id = $15 AND version = $16
            "#,
        )
        .bind(&record.gateway_handle)
        .bind(&record.destination_account)
        .bind(record.status.as_str())
        .bind(record.expires_at)
        .bind(record.auto_capture_at)
        .bind(&record.capture_reason)
        .bind(record.capture_attempts as i32)
        .bind(&record.last_error)
        .bind(&record.delivery_code)
        .bind(record.confirmed_at)
        .bind(record.captured_at)
        .bind(record.cancelled_at)
        .bind(record.version as i32)
        .bind(record.updated_at)
        .bind(Uuid::from(record.id))
        .bind(loaded_version as i32)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::StaleVersion(format!(
                "authorization {} was modified concurrently (expected version {})",
                record.id, loaded_version
            )));
        }
        Ok(())
    }

    pub async fn list_by_status(
        &self,
        status: AuthorizationStatus,
    ) -> Result<Vec<PaymentAuthorization>, DatabaseError> {
        let rows = sqlx::query_as::<_, AuthorizationRow>(&format!(
            "{SELECT_COLUMNS} WHERE status = $1 ORDER BY created_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PaymentAuthorization::try_from).collect()
    }

    /// All non-terminal authorizations on a trip
    pub async fn list_active_for_trip(
        &self,
        trip_id: TripId,
    ) -> Result<Vec<PaymentAuthorization>, DatabaseError> {
        let rows = sqlx::query_as::<_, AuthorizationRow>(&format!(
            "{SELECT_COLUMNS} WHERE trip_id = $1 AND status NOT IN ('captured', 'cancelled', 'expired') ORDER BY created_at"
        ))
        .bind(Uuid::from(trip_id))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PaymentAuthorization::try_from).collect()
    }
}
