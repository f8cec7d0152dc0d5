//! Payment domain errors
//!
//! The variants mirror the error taxonomy the API layer exposes: guard
//! violations and authorization failures come back synchronously as typed
//! errors; gateway unavailability is the only variant retried with backoff.

use thiserror::Error;

use core_kernel::{BookingId, MoneyError, PortError, SettingsError};

use crate::authorization::AuthorizationStatus;
use crate::escrow::EscrowError;
use crate::gateway::GatewayError;

/// Errors that can occur in the payment domain
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Operation not legal from the current status
    #[error("Cannot {operation} an authorization in status {status}")]
    InvalidState {
        operation: &'static str,
        status: AuthorizationStatus,
    },

    /// Actor lacks the right relation to the booking
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The processor declined; not retried automatically
    #[error("Gateway rejected: {0}")]
    GatewayRejected(String),

    /// Network or timeout failure; retried with backoff
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Policy rate limit hit before any state mutation
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// A concurrent writer won the race
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A non-terminal authorization already exists for the booking
    #[error("Booking {0} already has an active payment authorization")]
    DuplicateAuthorization(BookingId),

    /// A deadline required for the operation has already elapsed
    #[error("Deadline elapsed for {operation}")]
    DeadlineElapsed { operation: &'static str },

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Escrow error: {0}")]
    Escrow(#[from] EscrowError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Storage-layer failure that is not a domain condition
    #[error("Storage error: {0}")]
    Storage(PortError),
}

impl From<PortError> for PaymentError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => {
                PaymentError::NotFound(format!("{entity_type} {id}"))
            }
            PortError::Conflict { message } => PaymentError::Conflict(message),
            other => PaymentError::Storage(other),
        }
    }
}

impl From<GatewayError> for PaymentError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected { reason } => PaymentError::GatewayRejected(reason),
            GatewayError::NotCapturable { state } => {
                PaymentError::GatewayRejected(format!("not capturable in gateway state {state}"))
            }
            GatewayError::Unavailable { message } => PaymentError::GatewayUnavailable(message),
        }
    }
}

impl PaymentError {
    /// Returns true for failures worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            PaymentError::GatewayUnavailable(_) => true,
            PaymentError::Storage(err) => err.is_transient(),
            _ => false,
        }
    }
}
