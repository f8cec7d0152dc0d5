//! Pre-built test fixtures

use chrono::{DateTime, Duration, Utc};
use core_kernel::{Currency, Money};

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn usd(cents: i64) -> Money {
        Money::from_minor(cents, Currency::USD)
    }

    /// The standard $100.00 booking amount used across scenarios
    pub fn usd_100() -> Money {
        Self::usd(10_000)
    }

    /// A EUR amount for currency mismatch tests
    pub fn eur(cents: i64) -> Money {
        Money::from_minor(cents, Currency::EUR)
    }
}

/// Fixture for points in time relative to now
pub struct TemporalFixtures;

impl TemporalFixtures {
    pub fn hours_ahead(hours: i64) -> DateTime<Utc> {
        Utc::now() + Duration::hours(hours)
    }

    pub fn hours_ago(hours: i64) -> DateTime<Utc> {
        Utc::now() - Duration::hours(hours)
    }
}
