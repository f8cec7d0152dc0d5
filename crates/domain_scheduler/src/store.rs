//! Job store port and in-memory implementation
//!
//! The store owns claim exclusivity: `claim_next_due` must transition
//! exactly one pending job to running even under concurrent callers. The
//! PostgreSQL adapter does this with a conditional UPDATE; the in-memory
//! store serializes claims behind a mutex.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;

use core_kernel::{AuthorizationId, DomainPort, JobId, PortError};

use crate::error::SchedulerError;
use crate::job::{JobKind, JobStatus, ScheduledJob};

/// Queue depth and retry statistics for the operator surface
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Pending jobs already due
    pub due_now: u64,
}

/// Port for persisting and claiming scheduled jobs
#[async_trait]
pub trait JobStore: DomainPort {
    /// Enqueues a job
    ///
    /// Silently no-ops (returning None) when `scheduled_at` is already in
    /// the past, to avoid flooding the queue with dead work.
    async fn schedule(&self, job: ScheduledJob) -> Result<Option<JobId>, SchedulerError>;

    /// Fetches a job by id
    async fn get(&self, id: JobId) -> Result<ScheduledJob, SchedulerError>;

    /// Claims the next due pending job, ordered by (priority, scheduled_at)
    ///
    /// The claim is exclusive: the returned job has been transitioned
    /// pending -> running with its attempt counter incremented, and no
    /// concurrent caller can receive the same job.
    async fn claim_next_due(&self, now: DateTime<Utc>) -> Result<Option<ScheduledJob>, SchedulerError>;

    /// Writes back a job after execution (completed, retried, or failed)
    async fn persist(&self, job: &ScheduledJob) -> Result<(), SchedulerError>;

    /// Cancels still-pending jobs of the given kinds for an authorization
    ///
    /// Returns the number of jobs cancelled. Called in the same logical
    /// operation as the state transition that supersedes them.
    async fn cancel_for_authorization(
        &self,
        authorization_id: AuthorizationId,
        kinds: &[JobKind],
    ) -> Result<u32, SchedulerError>;

    /// Lists pending jobs for an authorization
    async fn pending_for_authorization(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<ScheduledJob>, SchedulerError>;

    /// Returns queue statistics
    async fn stats(&self) -> Result<QueueStats, SchedulerError>;
}

/// In-memory job store
///
/// Claim exclusivity comes from the single mutex: claim-check and
/// state flip happen in one critical section.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, ScheduledJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: returns all jobs regardless of status
    pub async fn all(&self) -> Vec<ScheduledJob> {
        self.jobs.lock().await.values().cloned().collect()
    }
}

impl DomainPort for InMemoryJobStore {}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn schedule(&self, job: ScheduledJob) -> Result<Option<JobId>, SchedulerError> {
        if job.scheduled_at < Utc::now() {
            tracing::debug!(kind = %job.kind, scheduled_at = %job.scheduled_at, "dropping past-dated job");
            return Ok(None);
        }
        let id = job.id;
        self.jobs.lock().await.insert(id, job);
        Ok(Some(id))
    }

    async fn get(&self, id: JobId) -> Result<ScheduledJob, SchedulerError> {
        self.jobs
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(SchedulerError::JobNotFound(id))
    }

    async fn claim_next_due(&self, now: DateTime<Utc>) -> Result<Option<ScheduledJob>, SchedulerError> {
        let mut jobs = self.jobs.lock().await;

        let next_id = jobs
            .values()
            .filter(|j| j.is_due(now))
            .min_by_key(|j| (j.priority, j.scheduled_at, *j.id.as_uuid()))
            .map(|j| j.id);

        match next_id {
            None => Ok(None),
            Some(id) => {
                let job = jobs.get_mut(&id).ok_or(SchedulerError::JobNotFound(id))?;
                job.mark_claimed();
                Ok(Some(job.clone()))
            }
        }
    }

    async fn persist(&self, job: &ScheduledJob) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        if !jobs.contains_key(&job.id) {
            return Err(SchedulerError::Store(PortError::not_found("ScheduledJob", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn cancel_for_authorization(
        &self,
        authorization_id: AuthorizationId,
        kinds: &[JobKind],
    ) -> Result<u32, SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let mut cancelled = 0;
        for job in jobs.values_mut() {
            if job.authorization_id == authorization_id
                && job.status == JobStatus::Pending
                && kinds.contains(&job.kind)
            {
                job.cancel();
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn pending_for_authorization(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<ScheduledJob>, SchedulerError> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .filter(|j| j.authorization_id == authorization_id && j.status == JobStatus::Pending)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<QueueStats, SchedulerError> {
        let jobs = self.jobs.lock().await;
        let now = Utc::now();
        let mut stats = QueueStats::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => {
                    stats.pending += 1;
                    if job.scheduled_at <= now {
                        stats.due_now += 1;
                    }
                }
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_kernel::BookingId;
    use std::sync::Arc;

    fn due_job(kind: JobKind, auth: AuthorizationId) -> ScheduledJob {
        let mut job = ScheduledJob::new(kind, auth, BookingId::new(), Utc::now() + Duration::seconds(1), 3);
        // Backdate after construction so schedule() accepts it but claim sees it due
        job.scheduled_at = Utc::now() - Duration::seconds(1);
        job
    }

    #[tokio::test]
    async fn test_past_dated_schedule_is_noop() {
        let store = InMemoryJobStore::new();
        let job = ScheduledJob::new(
            JobKind::Expiry,
            AuthorizationId::new(),
            BookingId::new(),
            Utc::now() - Duration::hours(1),
            3,
        );
        assert!(store.schedule(job).await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_claim_orders_by_priority_then_time() {
        let store = InMemoryJobStore::new();
        let auth = AuthorizationId::new();

        let reminder = due_job(JobKind::PaymentReminder, auth);
        let capture = due_job(JobKind::AutoCapture, auth);
        {
            let mut jobs = store.jobs.lock().await;
            jobs.insert(reminder.id, reminder);
            jobs.insert(capture.id, capture.clone());
        }

        let claimed = store.claim_next_due(Utc::now()).await.unwrap().unwrap();
        assert_eq!(claimed.id, capture.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempts, 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_exclusive() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = due_job(JobKind::AutoCapture, AuthorizationId::new());
        store.jobs.lock().await.insert(job.id, job);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.claim_next_due(Utc::now()).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_cancel_for_authorization_targets_kinds() {
        let store = InMemoryJobStore::new();
        let auth = AuthorizationId::new();
        let expiry = due_job(JobKind::Expiry, auth);
        let reminder = due_job(JobKind::ConfirmationReminder, auth);
        let capture = due_job(JobKind::AutoCapture, auth);
        {
            let mut jobs = store.jobs.lock().await;
            for j in [expiry, reminder, capture.clone()] {
                jobs.insert(j.id, j);
            }
        }

        let cancelled = store
            .cancel_for_authorization(auth, &[JobKind::Expiry, JobKind::ConfirmationReminder])
            .await
            .unwrap();
        assert_eq!(cancelled, 2);

        let pending = store.pending_for_authorization(auth).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, capture.id);
    }
}
