//! Traveler cancellation allowance
//!
//! Travelers get a bounded number of cancellations-with-confirmed-bookings
//! per calendar month. The count is materialized from prior allowed
//! cancellations, checked before any state mutation.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use core_kernel::{PortError, UserId};

/// Year-month key for the rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllowancePeriod {
    pub year: i32,
    pub month: u32,
}

impl AllowancePeriod {
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }
}

/// Materialized counter of allowance-charged cancellations
#[async_trait]
pub trait CancellationLedger: Send + Sync {
    /// Charged cancellations for the traveler in the given period
    async fn count(&self, traveler: UserId, period: AllowancePeriod) -> Result<u32, PortError>;

    /// Records one charged cancellation
    async fn record(&self, traveler: UserId, at: DateTime<Utc>) -> Result<(), PortError>;
}

#[derive(Default)]
pub struct InMemoryCancellationLedger {
    counts: Mutex<HashMap<(UserId, AllowancePeriod), u32>>,
}

impl InMemoryCancellationLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CancellationLedger for InMemoryCancellationLedger {
    async fn count(&self, traveler: UserId, period: AllowancePeriod) -> Result<u32, PortError> {
        let counts = self
            .counts
            .lock()
            .map_err(|_| PortError::internal("cancellation ledger lock poisoned"))?;
        Ok(counts.get(&(traveler, period)).copied().unwrap_or(0))
    }

    async fn record(&self, traveler: UserId, at: DateTime<Utc>) -> Result<(), PortError> {
        let mut counts = self
            .counts
            .lock()
            .map_err(|_| PortError::internal("cancellation ledger lock poisoned"))?;
        *counts
            .entry((traveler, AllowancePeriod::containing(at)))
            .or_insert(0) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_counts_are_per_month() {
        let ledger = InMemoryCancellationLedger::new();
        let traveler = UserId::new();

        let march = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let april = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();

        ledger.record(traveler, march).await.unwrap();
        ledger.record(traveler, march).await.unwrap();
        ledger.record(traveler, april).await.unwrap();

        let march_count = ledger
            .count(traveler, AllowancePeriod::containing(march))
            .await
            .unwrap();
        let april_count = ledger
            .count(traveler, AllowancePeriod::containing(april))
            .await
            .unwrap();
        assert_eq!(march_count, 2);
        assert_eq!(april_count, 1);
    }

    #[tokio::test]
    async fn test_counts_are_per_traveler() {
        let ledger = InMemoryCancellationLedger::new();
        let now = Utc::now();
        let a = UserId::new();
        let b = UserId::new();

        ledger.record(a, now).await.unwrap();
        let period = AllowancePeriod::containing(now);
        assert_eq!(ledger.count(a, period).await.unwrap(), 1);
        assert_eq!(ledger.count(b, period).await.unwrap(), 0);
    }
}
