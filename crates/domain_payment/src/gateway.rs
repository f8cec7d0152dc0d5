//! Payment gateway port
//!
//! The domain talks to the card processor exclusively through this
//! trait. Adapters own transport, retries, and circuit breaking; the
//! port surface carries only domain-meaningful outcomes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::{BookingId, Money, UserId};

/// Gateway call failures, already classified for the caller
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The processor declined the operation (bad card, insufficient funds)
    #[error("gateway rejected the operation: {reason}")]
    Rejected { reason: String },

    /// The charge exists but is not in a capturable state
    #[error("charge is not capturable from gateway state {state}")]
    NotCapturable { state: String },

    /// Transport failure or processor outage; the outcome is unknown
    #[error("gateway unavailable: {message}")]
    Unavailable { message: String },
}

impl GatewayError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        GatewayError::Rejected {
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        GatewayError::Unavailable {
            message: message.into(),
        }
    }

    /// Whether the true outcome at the gateway is unknown
    ///
    /// Unavailable calls may have succeeded remotely; those charges go
    /// through reconciliation rather than blind retry.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, GatewayError::Unavailable { .. })
    }
}

/// Remote charge state as reported by the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayChargeStatus {
    /// Funds reserved, waiting for capture
    RequiresCapture,
    /// Waiting on payer strong authentication
    RequiresAction,
    Captured,
    Cancelled,
    Failed,
}

/// Request to reserve funds
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeRequest {
    pub amount: Money,
    pub payer_id: UserId,
    pub booking_id: BookingId,
    /// Traveler's payable account receiving the eventual payout
    pub destination_account: String,
    /// Platform cut withheld from the destination transfer
    pub application_fee: Money,
    /// Require strong customer authentication for this charge
    pub strong_auth: bool,
}

/// A reservation held at the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayAuthorization {
    /// Opaque processor handle for later capture or cancel
    pub handle: String,
    pub status: GatewayChargeStatus,
}

#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    /// Reserves funds without moving them
    async fn authorize(&self, request: AuthorizeRequest)
        -> Result<GatewayAuthorization, GatewayError>;

    /// Captures a previously reserved charge, returns the settlement reference
    async fn capture(&self, handle: &str, amount: Money) -> Result<String, GatewayError>;

    /// Voids a reservation, releasing the hold on the payer's card
    async fn cancel(&self, handle: &str) -> Result<(), GatewayError>;

    /// Refunds part or all of a captured charge, returns the refund reference
    async fn refund(&self, handle: &str, amount: Money) -> Result<String, GatewayError>;

    /// Re-reads the remote state of a charge, used for reconciliation
    async fn retrieve(&self, handle: &str) -> Result<GatewayChargeStatus, GatewayError>;
}
