//! Escrow accounting
//!
//! Tracks held funds per authorization. The account never allows more to
//! leave than was held: `released + refunded <= held` at every point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::{AuthorizationId, EscrowAccountId, Money, MoneyError};

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("escrow over-draw: attempted to move {attempted} cents with only {available} held")]
    OverDraw { attempted: i64, available: i64 },

    #[error("escrow account is {0:?}, no further movement allowed")]
    Closed(EscrowStatus),

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Funds held, nothing disbursed yet
    Held,
    /// Some but not all funds disbursed
    PartiallyDisbursed,
    /// Everything held has been released or refunded
    Settled,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Held => "held",
            EscrowStatus::PartiallyDisbursed => "partially_disbursed",
            EscrowStatus::Settled => "settled",
        }
    }
}

/// Per-authorization escrow ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowAccount {
    id: EscrowAccountId,
    authorization_id: AuthorizationId,
    held: Money,
    released: Money,
    refunded: Money,
    status: EscrowStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EscrowAccount {
    /// Opens an account holding the full authorized amount
    pub fn open(authorization_id: AuthorizationId, amount: Money) -> Result<Self, EscrowError> {
        if !amount.is_positive() {
            return Err(EscrowError::NonPositiveAmount(amount.cents()));
        }
        let now = Utc::now();
        Ok(Self {
            id: EscrowAccountId::new_v7(),
            authorization_id,
            held: amount,
            released: Money::zero(amount.currency()),
            refunded: Money::zero(amount.currency()),
            status: EscrowStatus::Held,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> EscrowAccountId {
        self.id
    }

    pub fn authorization_id(&self) -> AuthorizationId {
        self.authorization_id
    }

    pub fn held(&self) -> Money {
        self.held
    }

    pub fn released(&self) -> Money {
        self.released
    }

    pub fn refunded(&self) -> Money {
        self.refunded
    }

    pub fn status(&self) -> EscrowStatus {
        self.status
    }

    /// Funds still held and movable
    pub fn available(&self) -> Money {
        let disbursed = self.released.cents() + self.refunded.cents();
        Money::from_minor(self.held.cents() - disbursed, self.held.currency())
    }

    /// Releases funds toward the traveler payout
    pub fn release(&mut self, amount: Money) -> Result<(), EscrowError> {
        self.check_draw(amount)?;
        self.released = self.released.checked_add(&amount)?;
        self.settle_if_drained();
        Ok(())
    }

    /// Refunds funds back to the payer
    pub fn refund(&mut self, amount: Money) -> Result<(), EscrowError> {
        self.check_draw(amount)?;
        self.refunded = self.refunded.checked_add(&amount)?;
        self.settle_if_drained();
        Ok(())
    }

    fn check_draw(&self, amount: Money) -> Result<(), EscrowError> {
        if self.status == EscrowStatus::Settled {
            return Err(EscrowError::Closed(self.status));
        }
        if !amount.is_positive() {
            return Err(EscrowError::NonPositiveAmount(amount.cents()));
        }
        let available = self.available();
        if amount.cents() > available.cents() {
            return Err(EscrowError::OverDraw {
                attempted: amount.cents(),
                available: available.cents(),
            });
        }
        Ok(())
    }

    fn settle_if_drained(&mut self) {
        self.updated_at = Utc::now();
        self.status = if self.available().is_zero() {
            EscrowStatus::Settled
        } else {
            EscrowStatus::PartiallyDisbursed
        };
    }
}

/// Used by the persistence layer to reconstruct an account from a row
/// without replaying draws.
#[derive(Debug, Clone)]
pub struct EscrowRecord {
    pub id: EscrowAccountId,
    pub authorization_id: AuthorizationId,
    pub held: Money,
    pub released: Money,
    pub refunded: Money,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&EscrowAccount> for EscrowRecord {
    fn from(account: &EscrowAccount) -> Self {
        Self {
            id: account.id,
            authorization_id: account.authorization_id,
            held: account.held,
            released: account.released,
            refunded: account.refunded,
            status: account.status,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

impl From<EscrowRecord> for EscrowAccount {
    fn from(row: EscrowRecord) -> Self {
        Self {
            id: row.id,
            authorization_id: row.authorization_id,
            held: row.held,
            released: row.released,
            refunded: row.refunded,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    fn usd(cents: i64) -> Money {
        Money::from_minor(cents, Currency::USD)
    }

    #[test]
    fn test_full_release_settles() {
        let mut escrow = EscrowAccount::open(AuthorizationId::new(), usd(10_000)).unwrap();
        assert_eq!(escrow.status(), EscrowStatus::Held);

        escrow.release(usd(10_000)).unwrap();
        assert_eq!(escrow.status(), EscrowStatus::Settled);
        assert!(escrow.available().is_zero());
    }

    #[test]
    fn test_split_refund_and_compensation() {
        let mut escrow = EscrowAccount::open(AuthorizationId::new(), usd(10_000)).unwrap();

        escrow.refund(usd(5_000)).unwrap();
        assert_eq!(escrow.status(), EscrowStatus::PartiallyDisbursed);

        escrow.release(usd(5_000)).unwrap();
        assert_eq!(escrow.status(), EscrowStatus::Settled);
        assert_eq!(escrow.released(), usd(5_000));
        assert_eq!(escrow.refunded(), usd(5_000));
    }

    #[test]
    fn test_over_draw_rejected() {
        let mut escrow = EscrowAccount::open(AuthorizationId::new(), usd(1_000)).unwrap();
        escrow.refund(usd(600)).unwrap();

        let result = escrow.release(usd(500));
        assert!(matches!(
            result,
            Err(EscrowError::OverDraw {
                attempted: 500,
                available: 400
            })
        ));
        // Failed draw leaves the account untouched
        assert_eq!(escrow.available(), usd(400));
    }

    #[test]
    fn test_settled_account_is_closed() {
        let mut escrow = EscrowAccount::open(AuthorizationId::new(), usd(100)).unwrap();
        escrow.release(usd(100)).unwrap();
        assert!(matches!(escrow.refund(usd(1)), Err(EscrowError::Closed(_))));
    }

    #[test]
    fn test_cannot_open_empty_account() {
        assert!(matches!(
            EscrowAccount::open(AuthorizationId::new(), usd(0)),
            Err(EscrowError::NonPositiveAmount(0))
        ));
    }
}
