//! Cancellation allowance charge repository
//!
//! One row per allowance-charged cancellation; the monthly count is a
//! range query rather than a maintained counter, so a crashed write can
//! never leave the counter out of step with the facts.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::UserId;

use crate::error::DatabaseError;

#[derive(Debug, Clone)]
pub struct AllowanceRepository {
    pool: PgPool,
}

impl AllowanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, traveler: UserId, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO cancellation_charges (id, traveler_id, charged_at) VALUES ($1, $2, $3)",
        )
        .bind(Uuid::now_v7())
        .bind(Uuid::from(traveler))
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Charged cancellations for the traveler inside one calendar month
    pub async fn count_in_month(
        &self,
        traveler: UserId,
        year: i32,
        month: u32,
    ) -> Result<u32, DatabaseError> {
        let start = Utc
            .with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| {
                DatabaseError::QueryFailed(format!("invalid allowance period {year}-{month}"))
            })?;
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let end = Utc
            .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| {
                DatabaseError::QueryFailed(format!("invalid allowance period {year}-{month}"))
            })?;

        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM cancellation_charges
            WHERE traveler_id = $1 AND charged_at >= $2 AND charged_at < $3
            "#,
        )
        .bind(Uuid::from(traveler))
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }
}
