//! Periodic job runner
//!
//! The runner claims due jobs one at a time and dispatches them to a
//! [`JobExecutor`]. It owns no domain logic: what a job means is the
//! executor's business, the runner only drives the claim / execute /
//! record-outcome cycle and the retry bookkeeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

use core_kernel::PortError;

use crate::error::SchedulerError;
use crate::job::ScheduledJob;
use crate::store::JobStore;

/// Result of executing one job
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The job did its work
    Completed { result: Option<serde_json::Value> },
    /// The authorization moved on before the job fired; nothing to do
    Superseded { reason: String },
}

/// Executes claimed jobs
///
/// Implementations must be idempotent or re-check the current state of the
/// authorization before acting, because a retried job can race a manual
/// action on the same authorization.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Runs one claimed job
    ///
    /// A transient error (`PortError::is_transient`) sends the job back to
    /// pending with backoff; any error after `max_attempts` is terminal.
    async fn execute(&self, job: &ScheduledJob) -> Result<JobOutcome, PortError>;

    /// Called when a job exhausts its attempts and goes terminally failed
    ///
    /// Implementations surface this to operators (event log, alerting).
    async fn on_exhausted(&self, _job: &ScheduledJob) {}
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Poll interval between queue sweeps
    pub poll_interval: Duration,
    /// Maximum jobs executed per sweep
    pub batch_size: u32,
    /// Base of the exponential retry backoff, in minutes
    pub backoff_base_minutes: i64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            batch_size: 20,
            backoff_base_minutes: 5,
        }
    }
}

/// The periodic runner over one logical job queue
pub struct JobRunner<S> {
    store: Arc<S>,
    executor: Arc<dyn JobExecutor>,
    config: RunnerConfig,
}

impl<S: JobStore> JobRunner<S> {
    pub fn new(store: Arc<S>, executor: Arc<dyn JobExecutor>, config: RunnerConfig) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    /// Runs forever, sweeping the queue every poll interval
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = self.config.poll_interval.as_secs(), "job runner started");

        loop {
            ticker.tick().await;
            if let Err(err) = self.run_once(Utc::now()).await {
                error!(error = %err, "queue sweep failed");
            }
        }
    }

    /// Executes due jobs until the queue is drained or the batch limit hits
    ///
    /// Returns the number of jobs executed. Exposed publicly so tests can
    /// drive the clock instead of sleeping.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<u32, SchedulerError> {
        let mut executed = 0;

        while executed < self.config.batch_size {
            let Some(job) = self.store.claim_next_due(now).await? else {
                break;
            };
            executed += 1;
            self.execute_claimed(job).await?;
        }

        if executed > 0 {
            debug!(executed, "queue sweep done");
        }
        Ok(executed)
    }

    async fn execute_claimed(&self, mut job: ScheduledJob) -> Result<(), SchedulerError> {
        let span = tracing::info_span!(
            "job_execution",
            job_id = %job.id,
            kind = %job.kind,
            attempt = job.attempts,
        );
        // The span wraps the whole future; holding an entered guard
        // across an await would detach it from the task on yield.
        async {
            match self.executor.execute(&job).await {
                Ok(JobOutcome::Completed { result }) => {
                    job.complete(result);
                    debug!("job completed");
                }
                Ok(JobOutcome::Superseded { reason }) => {
                    job.complete(Some(serde_json::json!({ "superseded": reason })));
                    debug!(reason, "job superseded");
                }
                Err(err) => {
                    let retried = job.fail(err.to_string(), self.config.backoff_base_minutes);
                    if retried {
                        warn!(error = %err, next_attempt_at = %job.scheduled_at, "job failed, retrying");
                    } else {
                        error!(error = %err, "job exhausted all attempts");
                        self.executor.on_exhausted(&job).await;
                    }
                }
            }

            self.store.persist(&job).await
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobKind, JobStatus};
    use crate::store::InMemoryJobStore;
    use chrono::Duration as ChronoDuration;
    use core_kernel::{AuthorizationId, BookingId};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedExecutor {
        failures_before_success: AtomicU32,
        exhausted: AtomicU32,
    }

    impl ScriptedExecutor {
        fn failing(n: u32) -> Self {
            Self {
                failures_before_success: AtomicU32::new(n),
                exhausted: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl JobExecutor for ScriptedExecutor {
        async fn execute(&self, _job: &ScheduledJob) -> Result<JobOutcome, PortError> {
            if self.failures_before_success.load(Ordering::SeqCst) > 0 {
                self.failures_before_success.fetch_sub(1, Ordering::SeqCst);
                return Err(PortError::ServiceUnavailable {
                    service: "gateway".to_string(),
                });
            }
            Ok(JobOutcome::Completed { result: None })
        }

        async fn on_exhausted(&self, _job: &ScheduledJob) {
            self.exhausted.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Schedules a job in the future, then backdates it so the sweep sees it due
    async fn seed_due_job(store: &InMemoryJobStore, kind: JobKind, max_attempts: u32) -> ScheduledJob {
        let mut job = ScheduledJob::new(
            kind,
            AuthorizationId::new(),
            BookingId::new(),
            Utc::now() + ChronoDuration::minutes(5),
            max_attempts,
        );
        store.schedule(job.clone()).await.unwrap();
        job.scheduled_at = Utc::now() - ChronoDuration::seconds(1);
        store.persist(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn test_successful_job_completes() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = seed_due_job(&store, JobKind::Expiry, 3).await;

        let executor = Arc::new(ScriptedExecutor::failing(0));
        let runner = JobRunner::new(Arc::clone(&store), executor, RunnerConfig::default());

        let executed = runner.run_once(Utc::now()).await.unwrap();
        assert_eq!(executed, 1);
        let stored = store.get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.executed_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweep_completes_from_a_spawned_task() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = seed_due_job(&store, JobKind::Expiry, 3).await;

        let executor = Arc::new(ScriptedExecutor::failing(0));
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&store),
            executor,
            RunnerConfig::default(),
        ));

        // The execution span must follow the future across threads
        let handle = tokio::spawn({
            let runner = Arc::clone(&runner);
            async move { runner.run_once(Utc::now()).await }
        });
        let executed = handle.await.unwrap().unwrap();
        assert_eq!(executed, 1);
        let stored = store.get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_transient_failure_reschedules_with_backoff() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = seed_due_job(&store, JobKind::AutoCapture, 3).await;

        let executor = Arc::new(ScriptedExecutor::failing(1));
        let runner = JobRunner::new(Arc::clone(&store), executor, RunnerConfig::default());
        runner.run_once(Utc::now()).await.unwrap();

        let stored = store.get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert!(stored.scheduled_at > Utc::now());
        assert!(stored.last_error.is_some());
    }

    #[tokio::test]
    async fn test_exhaustion_goes_terminal_and_alerts() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = seed_due_job(&store, JobKind::AutoCapture, 3).await;

        let executor = Arc::new(ScriptedExecutor::failing(10));
        let runner = JobRunner::new(Arc::clone(&store), Arc::clone(&executor) as Arc<dyn JobExecutor>, RunnerConfig::default());

        // Drive three attempts; backoff pushes scheduled_at forward, so
        // sweep with a clock far in the future each time.
        for i in 1..=3 {
            let future = Utc::now() + ChronoDuration::hours(i * 2);
            runner.run_once(future).await.unwrap();
        }

        let stored = store.get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.attempts, 3);
        assert_eq!(executor.exhausted.load(Ordering::SeqCst), 1);
    }
}
