//! Custom test assertions

use core_kernel::Money;

/// Asserts a Money value equals the given minor-unit amount
///
/// # Panics
///
/// Panics with both sides rendered when they differ.
pub fn assert_cents(actual: Money, expected_cents: i64) {
    assert_eq!(
        actual.cents(),
        expected_cents,
        "expected {} minor units, got {}",
        expected_cents,
        actual
    );
}

/// Asserts that the parts sum exactly back to the total
///
/// Money never appears or disappears across a settlement split.
pub fn assert_conserves(total: Money, parts: &[Money]) {
    let sum: i64 = parts.iter().map(Money::cents).sum();
    assert_eq!(
        sum,
        total.cents(),
        "split parts sum to {} minor units, total is {}",
        sum,
        total
    );
}
