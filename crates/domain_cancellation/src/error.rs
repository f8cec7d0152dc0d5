//! Cancellation domain errors

use thiserror::Error;

use core_kernel::PortError;
use domain_payment::{AuthorizationStatus, PaymentError};

#[derive(Debug, Error)]
pub enum CancellationError {
    /// The traveler's monthly allowance is spent; nothing was mutated
    #[error("cancellation allowance exhausted: {used} of {allowance} used this month")]
    LimitExceeded { used: u32, allowance: u32 },

    /// The authorization is in a state the engine cannot cancel from
    #[error("cannot cancel an authorization in status {status}")]
    NotCancellable { status: AuthorizationStatus },

    /// Actor has no standing on this booking
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("storage error: {0}")]
    Storage(#[from] PortError),
}
