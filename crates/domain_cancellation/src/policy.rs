//! Cancellation policy classification
//!
//! Pure functions from a cancellation context to a policy bucket and a
//! money split. All thresholds come from [`PaymentPolicy`] so product
//! can tune them without a deploy; nothing here touches storage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{Money, MoneyError, PaymentPolicy, Rate};
use domain_payment::AuthorizationStatus;

/// Who is asking to cancel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationActor {
    Sender,
    Traveler,
}

/// Everything classification needs, gathered by the engine
#[derive(Debug, Clone)]
pub struct CancellationContext {
    pub actor: CancellationActor,
    pub authorization_status: AuthorizationStatus,
    pub departure_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
    /// Confirmed bookings the traveler carries on the trip being cancelled
    pub traveler_confirmed_bookings: u32,
    /// The sender failed to hand over the package at departure
    pub no_show: bool,
}

/// Policy bucket driving the refund split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationBucket {
    /// Nothing confirmed yet and plenty of notice: full reversal
    Free,
    /// Enough notice on a confirmed booking: full refund minus the
    /// unrecoverable gateway processing fee
    Early,
    /// Short notice: the net amount splits evenly between the parties
    Late,
    /// Traveler cancels while carrying confirmed bookings; refunds are
    /// full-minus-gateway-fee and the traveler's allowance is charged
    TravelerWithBookings,
    /// Sender never handed the package over; the traveler keeps the net
    NoShow,
}

impl CancellationBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationBucket::Free => "free",
            CancellationBucket::Early => "early",
            CancellationBucket::Late => "late",
            CancellationBucket::TravelerWithBookings => "traveler_with_bookings",
            CancellationBucket::NoShow => "no_show",
        }
    }

    /// Whether this bucket consumes the traveler's monthly allowance
    pub fn charges_allowance(&self) -> bool {
        matches!(self, CancellationBucket::TravelerWithBookings)
    }
}

impl fmt::Display for CancellationBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies a cancellation into its policy bucket
pub fn classify(context: &CancellationContext, policy: &PaymentPolicy) -> CancellationBucket {
    if context.no_show {
        return CancellationBucket::NoShow;
    }
    if context.actor == CancellationActor::Traveler && context.traveler_confirmed_bookings > 0 {
        return CancellationBucket::TravelerWithBookings;
    }

    let hours_to_departure = (context.departure_at - context.now).num_hours();
    let late = hours_to_departure < policy.late_cancellation_threshold_hours;

    match context.authorization_status {
        // Nothing confirmed: no penalty as long as it is not last-minute
        AuthorizationStatus::Pending | AuthorizationStatus::PendingGatewaySetup if !late => {
            CancellationBucket::Free
        }
        _ if late => CancellationBucket::Late,
        _ => CancellationBucket::Early,
    }
}

/// The money consequences of one cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationSplit {
    pub refund: Money,
    pub compensation: Money,
    /// Share of the original amount refunded, for display (0..=100)
    pub refund_percent: Decimal,
    /// Processor fee the platform cannot recover
    pub gateway_fee: Money,
}

/// Computes the split for a bucket
///
/// The three parts (refund, compensation, gateway fee) always conserve
/// the original amount, so the escrow account settles exactly.
pub fn compute_split(
    amount: Money,
    bucket: CancellationBucket,
    policy: &PaymentPolicy,
) -> Result<CancellationSplit, MoneyError> {
    let gateway_fee = amount.percentage(Rate::from_percentage(policy.gateway_fee_percent))?;
    let net = amount.checked_sub(&gateway_fee)?;

    let (refund, compensation, gateway_fee) = match bucket {
        // Free reversals eat no fee: the reservation is voided, never
        // settled, so nothing unrecoverable was spent
        CancellationBucket::Free => (amount, Money::zero(amount.currency()), Money::zero(amount.currency())),
        CancellationBucket::Early | CancellationBucket::TravelerWithBookings => {
            (net, Money::zero(amount.currency()), gateway_fee)
        }
        CancellationBucket::Late => {
            let refund = net.percentage(Rate::new(dec!(0.5)))?;
            let compensation = net.checked_sub(&refund)?;
            (refund, compensation, gateway_fee)
        }
        CancellationBucket::NoShow => (Money::zero(amount.currency()), net, gateway_fee),
    };

    let refund_percent = if amount.is_zero() {
        Decimal::ZERO
    } else {
        (Decimal::from(refund.cents()) / Decimal::from(amount.cents()) * dec!(100)).round_dp(2)
    };

    Ok(CancellationSplit {
        refund,
        compensation,
        refund_percent,
        gateway_fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_kernel::Currency;

    fn usd(cents: i64) -> Money {
        Money::from_minor(cents, Currency::USD)
    }

    fn context(
        actor: CancellationActor,
        status: AuthorizationStatus,
        hours_before: i64,
    ) -> CancellationContext {
        let now = Utc::now();
        CancellationContext {
            actor,
            authorization_status: status,
            departure_at: now + Duration::hours(hours_before),
            now,
            traveler_confirmed_bookings: 0,
            no_show: false,
        }
    }

    #[test]
    fn test_unconfirmed_with_notice_is_free() {
        let policy = PaymentPolicy::default();
        let ctx = context(CancellationActor::Sender, AuthorizationStatus::Pending, 72);
        assert_eq!(classify(&ctx, &policy), CancellationBucket::Free);
    }

    #[test]
    fn test_confirmed_with_notice_is_early() {
        let policy = PaymentPolicy::default();
        let ctx = context(CancellationActor::Sender, AuthorizationStatus::Confirmed, 40);
        assert_eq!(classify(&ctx, &policy), CancellationBucket::Early);
    }

    #[test]
    fn test_short_notice_is_late() {
        let policy = PaymentPolicy::default();
        // Default late threshold is 24h
        let ctx = context(CancellationActor::Sender, AuthorizationStatus::Confirmed, 12);
        assert_eq!(classify(&ctx, &policy), CancellationBucket::Late);
    }

    #[test]
    fn test_traveler_with_bookings_overrides_timing() {
        let policy = PaymentPolicy::default();
        let mut ctx = context(CancellationActor::Traveler, AuthorizationStatus::Confirmed, 40);
        ctx.traveler_confirmed_bookings = 2;
        assert_eq!(classify(&ctx, &policy), CancellationBucket::TravelerWithBookings);
    }

    #[test]
    fn test_no_show_beats_everything() {
        let policy = PaymentPolicy::default();
        let mut ctx = context(CancellationActor::Traveler, AuthorizationStatus::Captured, 0);
        ctx.no_show = true;
        ctx.traveler_confirmed_bookings = 3;
        assert_eq!(classify(&ctx, &policy), CancellationBucket::NoShow);
    }

    #[test]
    fn test_free_split_returns_everything() {
        let policy = PaymentPolicy::default();
        let split = compute_split(usd(10_000), CancellationBucket::Free, &policy).unwrap();
        assert_eq!(split.refund, usd(10_000));
        assert!(split.compensation.is_zero());
        assert!(split.gateway_fee.is_zero());
        assert_eq!(split.refund_percent, dec!(100.00));
    }

    #[test]
    fn test_early_split_deducts_gateway_fee() {
        let policy = PaymentPolicy::default();
        // Default gateway fee 2.9%: $100.00 -> $2.90 fee
        let split = compute_split(usd(10_000), CancellationBucket::Early, &policy).unwrap();
        assert_eq!(split.gateway_fee, usd(290));
        assert_eq!(split.refund, usd(9_710));
        assert!(split.compensation.is_zero());
        assert_eq!(split.refund_percent, dec!(97.10));
    }

    #[test]
    fn test_late_split_halves_the_net() {
        let policy = PaymentPolicy::default();
        let split = compute_split(usd(10_000), CancellationBucket::Late, &policy).unwrap();
        assert_eq!(split.gateway_fee, usd(290));
        assert_eq!(split.refund, usd(4_855));
        assert_eq!(split.compensation, usd(4_855));
        // Parts conserve the amount
        assert_eq!(
            split.refund.cents() + split.compensation.cents() + split.gateway_fee.cents(),
            10_000
        );
    }

    #[test]
    fn test_no_show_split_compensates_traveler() {
        let policy = PaymentPolicy::default();
        let split = compute_split(usd(10_000), CancellationBucket::NoShow, &policy).unwrap();
        assert!(split.refund.is_zero());
        assert_eq!(split.compensation, usd(9_710));
        assert_eq!(split.refund_percent, Decimal::ZERO);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use core_kernel::Currency;
    use proptest::prelude::*;

    fn bucket_strategy() -> impl Strategy<Value = CancellationBucket> {
        prop_oneof![
            Just(CancellationBucket::Free),
            Just(CancellationBucket::Early),
            Just(CancellationBucket::Late),
            Just(CancellationBucket::TravelerWithBookings),
            Just(CancellationBucket::NoShow),
        ]
    }

    proptest! {
        #[test]
        fn split_conserves_the_held_amount(
            cents in 1i64..1_000_000_000i64,
            bucket in bucket_strategy()
        ) {
            let policy = PaymentPolicy::default();
            let amount = Money::from_minor(cents, Currency::USD);
            let split = compute_split(amount, bucket, &policy).unwrap();
            prop_assert!(split.refund.cents() >= 0);
            prop_assert!(split.compensation.cents() >= 0);
            prop_assert_eq!(
                split.refund.cents() + split.compensation.cents() + split.gateway_fee.cents(),
                cents
            );
        }
    }
}
