//! Job repository
//!
//! Claim exclusivity uses a conditional UPDATE over a `FOR UPDATE SKIP
//! LOCKED` subselect: exactly one worker flips the row to running, and
//! competing workers skip it instead of blocking.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{AuthorizationId, JobId};
use domain_scheduler::{JobKind, QueueStats, ScheduledJob};

use crate::error::DatabaseError;
use crate::rows::JobRow;

const SELECT_COLUMNS: &str = r#"
    SELECT id, kind, authorization_id, booking_id, scheduled_at, status,
           priority, attempts, max_attempts, payload, result, last_error,
           executed_at, created_at
    FROM scheduled_jobs
"#;

#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, job: &ScheduledJob) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (
                id, kind, authorization_id, booking_id, scheduled_at, status,
                priority, attempts, max_attempts, payload, result, last_error,
                executed_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(Uuid::from(job.id))
        .bind(job.kind.as_str())
        .bind(Uuid::from(job.authorization_id))
        .bind(Uuid::from(job.booking_id))
        .bind(job.scheduled_at)
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(job.attempts as i32)
        .bind(job.max_attempts as i32)
        .bind(&job.payload)
        .bind(&job.result)
        .bind(&job.last_error)
        .bind(job.executed_at)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch(&self, id: JobId) -> Result<Option<ScheduledJob>, DatabaseError> {
        let row = sqlx::query_as::<_, JobRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(ScheduledJob::try_from).transpose()
    }

    /// Claims the next due pending job
    ///
    /// The returned row is already running with its attempt counter
    /// incremented. Concurrent callers never receive the same job.
    pub async fn claim_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledJob>, DatabaseError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE scheduled_jobs
            SET status = 'running', attempts = attempts + 1
            WHERE id = (
                SELECT id FROM scheduled_jobs
                WHERE status = 'pending' AND scheduled_at <= $1
                ORDER BY priority, scheduled_at, id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, kind, authorization_id, booking_id, scheduled_at, status,
                      priority, attempts, max_attempts, payload, result, last_error,
                      executed_at, created_at
            "#,
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ScheduledJob::try_from).transpose()
    }

    /// Writes back a job after execution
    pub async fn persist(&self, job: &ScheduledJob) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_jobs SET
                scheduled_at = $1, status = $2, attempts = $3, result = $4,
                last_error = $5, executed_at = $6
            WHERE id = $7
            "#,
        )
        .bind(job.scheduled_at)
        .bind(job.status.as_str())
        .bind(job.attempts as i32)
        .bind(&job.result)
        .bind(&job.last_error)
        .bind(job.executed_at)
        .bind(Uuid::from(job.id))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("ScheduledJob", job.id));
        }
        Ok(())
    }

    /// Cancels still-pending jobs of the given kinds for an authorization
    pub async fn cancel_for_authorization(
        &self,
        authorization_id: AuthorizationId,
        kinds: &[JobKind],
    ) -> Result<u32, DatabaseError> {
        let kind_names: Vec<&str> = kinds.iter().map(JobKind::as_str).collect();
        let result = sqlx::query(
            r#"
            UPDATE scheduled_jobs
            SET status = 'cancelled'
            WHERE authorization_id = $1 AND status = 'pending' AND kind = ANY($2)
            "#,
        )
        .bind(Uuid::from(authorization_id))
        .bind(&kind_names)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as u32)
    }

    pub async fn pending_for_authorization(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<ScheduledJob>, DatabaseError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "{SELECT_COLUMNS} WHERE authorization_id = $1 AND status = 'pending' ORDER BY scheduled_at"
        ))
        .bind(Uuid::from(authorization_id))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ScheduledJob::try_from).collect()
    }

    /// Queue depth counts for the operator surface
    pub async fn stats(&self, now: DateTime<Utc>) -> Result<QueueStats, DatabaseError> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT status,
                   COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'pending' AND scheduled_at <= $1)
            FROM scheduled_jobs
            GROUP BY status
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status, count, due) in rows {
            let count = count as u64;
            match status.as_str() {
                "pending" => {
                    stats.pending = count;
                    stats.due_now = due as u64;
                }
                "running" => stats.running = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                "cancelled" => stats.cancelled = count,
                other => {
                    return Err(DatabaseError::CorruptRow(format!(
                        "unknown job status '{other}'"
                    )))
                }
            }
        }
        Ok(stats)
    }
}
