//! Scheduler domain errors

use thiserror::Error;
use core_kernel::{JobId, PortError};

/// Errors that can occur in the scheduler domain
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Job is not in a state that permits the operation
    #[error("Job {job_id} is {status}, cannot {operation}")]
    InvalidJobState {
        job_id: JobId,
        status: String,
        operation: &'static str,
    },

    /// The claim lost to a concurrent worker
    #[error("Job {0} was claimed by another worker")]
    ClaimLost(JobId),

    /// Storage-layer failure
    #[error("Job store error: {0}")]
    Store(#[from] PortError),
}
