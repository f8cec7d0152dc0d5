//! Test data builders
//!
//! Builders with sensible defaults so tests only spell out the fields
//! they actually care about.

use chrono::{DateTime, Utc};
use core_kernel::{BookingId, Money, TripId, UserId};
use domain_payment::BookingSnapshot;

use crate::fixtures::{MoneyFixtures, TemporalFixtures};

/// Builder for [`BookingSnapshot`] test data
///
/// Defaults: a $100.00 USD booking departing in 72 hours with an
/// onboarded traveler and no other confirmed bookings.
pub struct BookingSnapshotBuilder {
    booking_id: BookingId,
    trip_id: TripId,
    sender_id: UserId,
    traveler_id: UserId,
    amount: Money,
    departure_at: DateTime<Utc>,
    destination_account: Option<String>,
    traveler_confirmed_bookings: u32,
}

impl Default for BookingSnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingSnapshotBuilder {
    pub fn new() -> Self {
        Self {
            booking_id: BookingId::new(),
            trip_id: TripId::new(),
            sender_id: UserId::new(),
            traveler_id: UserId::new(),
            amount: MoneyFixtures::usd_100(),
            departure_at: TemporalFixtures::hours_ahead(72),
            destination_account: Some("acct_traveler".to_string()),
            traveler_confirmed_bookings: 0,
        }
    }

    pub fn with_trip(mut self, trip_id: TripId) -> Self {
        self.trip_id = trip_id;
        self
    }

    pub fn with_sender(mut self, sender_id: UserId) -> Self {
        self.sender_id = sender_id;
        self
    }

    pub fn with_traveler(mut self, traveler_id: UserId) -> Self {
        self.traveler_id = traveler_id;
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn departing_in_hours(mut self, hours: i64) -> Self {
        self.departure_at = TemporalFixtures::hours_ahead(hours);
        self
    }

    /// Traveler not yet onboarded at the gateway
    pub fn without_destination_account(mut self) -> Self {
        self.destination_account = None;
        self
    }

    pub fn with_confirmed_bookings(mut self, count: u32) -> Self {
        self.traveler_confirmed_bookings = count;
        self
    }

    pub fn booking_id(&self) -> BookingId {
        self.booking_id
    }

    pub fn build(self) -> BookingSnapshot {
        BookingSnapshot {
            booking_id: self.booking_id,
            trip_id: self.trip_id,
            sender_id: self.sender_id,
            traveler_id: self.traveler_id,
            amount: self.amount,
            departure_at: self.departure_at,
            destination_account: self.destination_account,
            traveler_confirmed_bookings: self.traveler_confirmed_bookings,
        }
    }
}
