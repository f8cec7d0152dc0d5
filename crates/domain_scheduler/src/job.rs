//! Scheduled job entity
//!
//! A job is one pending time-triggered action owned by a payment
//! authorization. Superseded jobs are cancelled, never deleted, so the
//! queue doubles as a record of what the system intended to do.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AuthorizationId, BookingId, JobId};

/// Kinds of time-triggered work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Capture a confirmed authorization at its auto-capture time
    AutoCapture,
    /// Expire an authorization whose active deadline elapsed
    Expiry,
    /// Remind the sender to confirm before the confirmation deadline
    ConfirmationReminder,
    /// Remind the sender that capture is imminent
    PaymentReminder,
}

impl JobKind {
    /// Default priority for this kind; lower runs sooner
    pub fn priority(&self) -> i32 {
        match self {
            JobKind::AutoCapture => 10,
            JobKind::Expiry => 20,
            JobKind::ConfirmationReminder => 50,
            JobKind::PaymentReminder => 50,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::AutoCapture => "auto_capture",
            JobKind::Expiry => "expiry",
            JobKind::ConfirmationReminder => "confirmation_reminder",
            JobKind::PaymentReminder => "payment_reminder",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Upper bound on any retry delay
pub const MAX_BACKOFF_MINUTES: i64 = 60;

/// Retry delay before attempt `attempts + 1`
///
/// `min(60, 2^attempts * base)` minutes; with the default base of 5
/// that is 10, 20, 40, 60, 60, ... Monotone non-decreasing and capped,
/// so a flapping gateway cannot amplify load.
pub fn retry_backoff(attempts: u32, base_minutes: i64) -> Duration {
    let capped = attempts.min(6);
    let minutes = (2_i64.pow(capped) * base_minutes.max(1)).min(MAX_BACKOFF_MINUTES);
    Duration::minutes(minutes)
}

/// A persisted, time-triggered work item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Unique identifier
    pub id: JobId,
    /// Kind of work
    pub kind: JobKind,
    /// Owning authorization
    pub authorization_id: AuthorizationId,
    /// Owning booking
    pub booking_id: BookingId,
    /// When the job becomes due
    pub scheduled_at: DateTime<Utc>,
    /// Current status
    pub status: JobStatus,
    /// Lower runs sooner
    pub priority: i32,
    /// Executed attempts so far
    pub attempts: u32,
    /// Attempts after which failure is terminal
    pub max_attempts: u32,
    /// Opaque input payload
    pub payload: serde_json::Value,
    /// Result payload from the last successful run
    pub result: Option<serde_json::Value>,
    /// Error text from the last failed run
    pub last_error: Option<String>,
    /// When the final attempt finished (completed or terminally failed)
    pub executed_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// Creates a new pending job
    pub fn new(
        kind: JobKind,
        authorization_id: AuthorizationId,
        booking_id: BookingId,
        scheduled_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: JobId::new_v7(),
            kind,
            authorization_id,
            booking_id,
            scheduled_at,
            status: JobStatus::Pending,
            priority: kind.priority(),
            attempts: 0,
            max_attempts,
            payload: serde_json::Value::Null,
            result: None,
            last_error: None,
            executed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the input payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Overrides the default priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Returns true if the job is due at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_at <= now
    }

    /// Marks a claimed job: pending -> running, attempts incremented
    ///
    /// The store is responsible for making this exclusive; the entity just
    /// records the transition.
    pub(crate) fn mark_claimed(&mut self) {
        self.status = JobStatus::Running;
        self.attempts += 1;
    }

    /// Records a successful run
    pub fn complete(&mut self, result: Option<serde_json::Value>) {
        self.status = JobStatus::Completed;
        self.result = result;
        self.executed_at = Some(Utc::now());
        self.last_error = None;
    }

    /// Records a failed run
    ///
    /// If attempts remain the job returns to pending with a backoff delay
    /// strictly later than the previous schedule; otherwise it goes
    /// terminally failed. Returns true when a retry was scheduled.
    pub fn fail(&mut self, error: impl Into<String>, backoff_base_minutes: i64) -> bool {
        self.last_error = Some(error.into());
        if self.attempts < self.max_attempts {
            let delay = retry_backoff(self.attempts, backoff_base_minutes);
            let now = Utc::now();
            // Retry time must move strictly forward even for stale schedules
            self.scheduled_at = now.max(self.scheduled_at) + delay;
            self.status = JobStatus::Pending;
            true
        } else {
            self.status = JobStatus::Failed;
            self.executed_at = Some(Utc::now());
            false
        }
    }

    /// Cancels a superseded job
    pub fn cancel(&mut self) {
        if matches!(self.status, JobStatus::Pending | JobStatus::Running) {
            self.status = JobStatus::Cancelled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job(scheduled_at: DateTime<Utc>) -> ScheduledJob {
        ScheduledJob::new(
            JobKind::AutoCapture,
            AuthorizationId::new(),
            BookingId::new(),
            scheduled_at,
            3,
        )
    }

    #[test]
    fn test_backoff_sequence() {
        assert_eq!(retry_backoff(1, 5), Duration::minutes(10));
        assert_eq!(retry_backoff(2, 5), Duration::minutes(20));
        assert_eq!(retry_backoff(3, 5), Duration::minutes(40));
        assert_eq!(retry_backoff(4, 5), Duration::minutes(60));
        assert_eq!(retry_backoff(5, 5), Duration::minutes(60));
    }

    #[test]
    fn test_backoff_base_scales_the_delay() {
        assert_eq!(retry_backoff(1, 2), Duration::minutes(4));
        assert_eq!(retry_backoff(1, 20), Duration::minutes(40));
        // Still capped whatever the base
        assert_eq!(retry_backoff(3, 20), Duration::minutes(60));
        // A nonsense base falls back to the smallest usable one
        assert_eq!(retry_backoff(1, 0), Duration::minutes(2));
    }

    #[test]
    fn test_fail_reschedules_until_exhausted() {
        let mut job = test_job(Utc::now());
        job.mark_claimed();
        assert_eq!(job.attempts, 1);

        assert!(job.fail("gateway timeout", 5));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.scheduled_at > Utc::now());

        job.mark_claimed();
        assert!(job.fail("gateway timeout", 5));
        job.mark_claimed();

        // Third failure exhausts max_attempts = 3
        assert!(!job.fail("gateway timeout", 5));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.executed_at.is_some());
    }

    #[test]
    fn test_retry_is_strictly_later() {
        let mut job = test_job(Utc::now() - Duration::hours(2));
        job.mark_claimed();
        let before = job.scheduled_at;
        job.fail("transient", 5);
        assert!(job.scheduled_at > before);
        assert!(job.scheduled_at > Utc::now());
    }

    #[test]
    fn test_cancel_only_from_live_states() {
        let mut job = test_job(Utc::now());
        job.mark_claimed();
        job.complete(None);
        job.cancel();
        assert_eq!(job.status, JobStatus::Completed);

        let mut job = test_job(Utc::now());
        job.cancel();
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn test_priority_ordering_of_kinds() {
        assert!(JobKind::AutoCapture.priority() < JobKind::Expiry.priority());
        assert!(JobKind::Expiry.priority() < JobKind::PaymentReminder.priority());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn backoff_is_monotone_and_capped(a in 0u32..100u32, base in 1i64..30i64) {
            let current = retry_backoff(a, base);
            let next = retry_backoff(a + 1, base);
            prop_assert!(next >= current);
            prop_assert!(current <= Duration::minutes(MAX_BACKOFF_MINUTES));
        }
    }
}
