//! Scheduler Domain - the time axis of the payment engine
//!
//! Every deadline in the system (confirmation expiry, capture expiry,
//! auto-capture, reminders) is enforced by exactly one mechanism: a
//! persisted [`ScheduledJob`] claimed and executed by the [`JobRunner`].
//! There is no other timer.
//!
//! # Claim semantics
//!
//! The queue is a single logical queue that may be serviced by multiple
//! workers. Correctness relies on an atomic claim (conditional
//! pending -> running update), not leader election: a job is never executed
//! twice concurrently.
//!
//! # Retry discipline
//!
//! Failed jobs retry with exponential backoff `min(60, 2^attempts * 5)`
//! minutes until `max_attempts` is exhausted, then go terminal with an
//! operator-visible alert. Handlers must re-check the state they act on,
//! because a retried job can race a manual action.

pub mod job;
pub mod store;
pub mod runner;
pub mod error;

pub use job::{ScheduledJob, JobKind, JobStatus, retry_backoff};
pub use store::{JobStore, InMemoryJobStore, QueueStats};
pub use runner::{JobRunner, JobExecutor, JobOutcome, RunnerConfig};
pub use error::SchedulerError;
