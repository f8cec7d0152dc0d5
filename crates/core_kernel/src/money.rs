//! Money types in integer minor units
//!
//! All amounts in the payment engine are whole minor-currency units (cents).
//! Percentage math (platform fee, refund splits) goes through rust_decimal
//! and is rounded back to minor units, so no floating point ever touches
//! a balance.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    CHF,
    AUD,
    CAD,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        2
    }

    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::CHF => "CHF",
            Currency::AUD => "A$",
            Currency::CAD => "C$",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::CHF => "CHF",
            Currency::AUD => "AUD",
            Currency::CAD => "CAD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount in integer minor units with associated currency
///
/// Arithmetic is checked: overflow and currency mismatch are errors,
/// never silent wraparound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    cents: i64,
    currency: Currency,
}

impl Money {
    /// Creates Money from an amount in minor units (e.g., cents)
    pub fn from_minor(cents: i64, currency: Currency) -> Self {
        Self { cents, currency }
    }

    /// Creates a zero amount in the specified currency
    pub fn zero(currency: Currency) -> Self {
        Self { cents: 0, currency }
    }

    /// Returns the amount in minor units
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the currency
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self {
            cents: self.cents.abs(),
            currency: self.currency,
        }
    }

    /// Checked addition that returns an error on currency mismatch or overflow
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let cents = self.cents.checked_add(other.cents).ok_or(MoneyError::Overflow)?;
        Ok(Self { cents, currency: self.currency })
    }

    /// Checked subtraction that returns an error on currency mismatch or overflow
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let cents = self.cents.checked_sub(other.cents).ok_or(MoneyError::Overflow)?;
        Ok(Self { cents, currency: self.currency })
    }

    /// Applies a percentage rate, rounding half-away-from-zero to minor units
    ///
    /// `Money::from_minor(10000, USD).percentage(Rate::from_percentage(dec!(5)))`
    /// yields 500 cents.
    pub fn percentage(&self, rate: Rate) -> Result<Money, MoneyError> {
        let raw = Decimal::from(self.cents) * rate.as_decimal();
        let rounded = raw.round_dp_with_strategy(
            0,
            rust_decimal::RoundingStrategy::MidpointAwayFromZero,
        );
        let cents: i64 = rounded
            .try_into()
            .map_err(|_| MoneyError::Overflow)?;
        Ok(Self { cents, currency: self.currency })
    }

    /// Splits the amount into two halves; the first half receives any odd cent
    ///
    /// Used for the 50/50 late-cancellation split. The two parts always sum
    /// to the original amount.
    pub fn split_even(&self) -> (Money, Money) {
        let first = (self.cents + 1) / 2;
        let second = self.cents - first;
        (
            Self { cents: first, currency: self.currency },
            Self { cents: second, currency: self.currency },
        )
    }

    fn require_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(())
    }
}

/// Ordering is only defined within a single currency. Comparing
/// amounts in different currencies yields `None` rather than an
/// arbitrary total order.
impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        (self.currency == other.currency).then(|| self.cents.cmp(&other.cents))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = 10_i64.pow(self.currency.decimal_places());
        write!(
            f,
            "{}{}.{:02}",
            self.currency.symbol(),
            self.cents / dp,
            (self.cents % dp).abs()
        )
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            cents: -self.cents,
            currency: self.currency,
        }
    }
}

/// Represents a percentage rate (e.g., platform fee rate, gateway fee rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// The rate as a decimal fraction (e.g., 0.05 for 5%)
    value: Decimal,
}

impl Rate {
    /// Creates a rate from a decimal fraction (e.g., 0.05 for 5%)
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Creates a rate from a percentage (e.g., 5.0 for 5%)
    pub fn from_percentage(percentage: Decimal) -> Self {
        Self {
            value: percentage / dec!(100),
        }
    }

    /// Returns the rate as a decimal fraction
    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.value * dec!(100)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().round_dp(4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_creation() {
        let m = Money::from_minor(10050, Currency::USD);
        assert_eq!(m.cents(), 10050);
        assert_eq!(m.currency(), Currency::USD);
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_minor(10000, Currency::USD);
        let b = Money::from_minor(5000, Currency::USD);

        assert_eq!(a.checked_add(&b).unwrap().cents(), 15000);
        assert_eq!(a.checked_sub(&b).unwrap().cents(), 5000);
    }

    #[test]
    fn test_ordering_is_scoped_to_one_currency() {
        let small = Money::from_minor(5_000, Currency::USD);
        let large = Money::from_minor(10_000, Currency::USD);
        assert!(small < large);
        assert!(large >= small);

        let eur = Money::from_minor(10_000, Currency::EUR);
        assert_eq!(large.partial_cmp(&eur), None);
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Money::from_minor(10000, Currency::USD);
        let eur = Money::from_minor(10000, Currency::EUR);

        let result = usd.checked_add(&eur);
        assert!(matches!(result, Err(MoneyError::CurrencyMismatch(_, _))));
    }

    #[test]
    fn test_percentage_rounds_to_minor_units() {
        let m = Money::from_minor(10000, Currency::USD);
        let fee = m.percentage(Rate::from_percentage(dec!(5))).unwrap();
        assert_eq!(fee.cents(), 500);

        // 2.9% of 999 cents = 28.971 -> 29
        let m = Money::from_minor(999, Currency::USD);
        let fee = m.percentage(Rate::from_percentage(dec!(2.9))).unwrap();
        assert_eq!(fee.cents(), 29);
    }

    #[test]
    fn test_split_even_conserves_total() {
        let m = Money::from_minor(10001, Currency::USD);
        let (a, b) = m.split_even();
        assert_eq!(a.cents(), 5001);
        assert_eq!(b.cents(), 5000);
        assert_eq!(a.checked_add(&b).unwrap(), m);
    }

    #[test]
    fn test_display() {
        let m = Money::from_minor(10050, Currency::USD);
        assert_eq!(m.to_string(), "$100.50");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn split_even_always_conserves(amount in 0i64..1_000_000_000i64) {
            let money = Money::from_minor(amount, Currency::USD);
            let (a, b) = money.split_even();
            prop_assert_eq!(a.cents() + b.cents(), amount);
            prop_assert!((a.cents() - b.cents()).abs() <= 1);
        }

        #[test]
        fn percentage_of_nonnegative_is_bounded(
            amount in 0i64..1_000_000_000i64,
            pct in 0u32..=100u32
        ) {
            let money = Money::from_minor(amount, Currency::USD);
            let rate = Rate::from_percentage(Decimal::from(pct));
            let part = money.percentage(rate).unwrap();
            prop_assert!(part.cents() >= 0);
            prop_assert!(part.cents() <= amount + 1);
        }
    }
}
