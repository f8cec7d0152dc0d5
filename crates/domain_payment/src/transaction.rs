//! Ledger transactions
//!
//! Every movement of money gets a row here, whether or not the gateway
//! call behind it succeeded. The ledger is append-only; a transaction
//! changes status but is never deleted or amended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AuthorizationId, BookingId, Money, TransactionId};

/// What a transaction represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Funds reserved at the gateway
    Authorization,
    /// Reserved funds moved to the platform
    Capture,
    /// Money returned to the payer
    Refund,
    /// Compensation leg paid to the traveler on cancellation
    Compensation,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Authorization => "authorization",
            TransactionKind::Capture => "capture",
            TransactionKind::Refund => "refund",
            TransactionKind::Compensation => "compensation",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Settled,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Settled => "settled",
            TransactionStatus::Failed => "failed",
        }
    }
}

/// One ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub authorization_id: AuthorizationId,
    pub booking_id: BookingId,
    pub kind: TransactionKind,
    pub amount: Money,
    pub status: TransactionStatus,
    /// Gateway-side reference for reconciliation
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl LedgerTransaction {
    pub fn new(
        authorization_id: AuthorizationId,
        booking_id: BookingId,
        kind: TransactionKind,
        amount: Money,
    ) -> Self {
        Self {
            id: TransactionId::new_v7(),
            authorization_id,
            booking_id,
            kind,
            amount,
            status: TransactionStatus::Pending,
            gateway_reference: None,
            failure_reason: None,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    /// Marks the transaction settled with the gateway's reference
    pub fn settle(mut self, gateway_reference: impl Into<String>) -> Self {
        self.status = TransactionStatus::Settled;
        self.gateway_reference = Some(gateway_reference.into());
        self.settled_at = Some(Utc::now());
        self
    }

    /// Marks the transaction failed, keeping the row for the audit trail
    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        self.status = TransactionStatus::Failed;
        self.failure_reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    #[test]
    fn test_settle_records_reference() {
        let txn = LedgerTransaction::new(
            AuthorizationId::new(),
            BookingId::new(),
            TransactionKind::Capture,
            Money::from_minor(10_000, Currency::USD),
        );
        assert_eq!(txn.status, TransactionStatus::Pending);

        let settled = txn.settle("ch_abc123");
        assert_eq!(settled.status, TransactionStatus::Settled);
        assert_eq!(settled.gateway_reference.as_deref(), Some("ch_abc123"));
        assert!(settled.settled_at.is_some());
    }

    #[test]
    fn test_failed_transaction_keeps_reason() {
        let txn = LedgerTransaction::new(
            AuthorizationId::new(),
            BookingId::new(),
            TransactionKind::Refund,
            Money::from_minor(2_500, Currency::USD),
        )
        .fail("gateway timeout");
        assert_eq!(txn.status, TransactionStatus::Failed);
        assert_eq!(txn.failure_reason.as_deref(), Some("gateway timeout"));
        assert!(txn.settled_at.is_none());
    }
}
