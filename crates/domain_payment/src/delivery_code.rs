//! Delivery code generation
//!
//! A short numeric code the sender gives the recipient; the traveler
//! must present a matching code to complete handover and trigger the
//! escrow release. Codes only need to be unique among a traveler's
//! in-flight deliveries, so six digits with a bounded retry is plenty.

use thiserror::Error;
use uuid::Uuid;

const CODE_DIGITS: u32 = 6;
const MAX_GENERATION_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum DeliveryCodeError {
    /// Every generated candidate collided with an existing code
    #[error("could not generate a unique delivery code after {0} attempts")]
    CodeCollision(usize),
}

/// Generates a zero-padded numeric delivery code
///
/// `is_taken` reports whether a candidate already belongs to another
/// in-flight delivery. The loop is bounded so a pathological predicate
/// cannot hang the caller.
pub fn generate_delivery_code(
    mut is_taken: impl FnMut(&str) -> bool,
) -> Result<String, DeliveryCodeError> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let candidate = random_code();
        if !is_taken(&candidate) {
            return Ok(candidate);
        }
    }
    Err(DeliveryCodeError::CodeCollision(MAX_GENERATION_ATTEMPTS))
}

fn random_code() -> String {
    let entropy = Uuid::new_v4();
    let value = u64::from_le_bytes(
        entropy.as_bytes()[..8]
            .try_into()
            .unwrap_or([0u8; 8]),
    );
    let modulus = 10u64.pow(CODE_DIGITS);
    format!("{:0width$}", value % modulus, width = CODE_DIGITS as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_code_shape() {
        let code = generate_delivery_code(|_| false).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_retries_past_collisions() {
        let mut seen = 0;
        let code = generate_delivery_code(|_| {
            seen += 1;
            seen <= 3
        })
        .unwrap();
        assert_eq!(seen, 4);
        assert_eq!(code.len(), 6);
    }

    #[test]
    fn test_gives_up_when_space_exhausted() {
        let result = generate_delivery_code(|_| true);
        assert!(matches!(result, Err(DeliveryCodeError::CodeCollision(_))));
    }

    #[test]
    fn test_codes_vary() {
        let codes: HashSet<_> = (0..50)
            .map(|_| generate_delivery_code(|_| false).unwrap())
            .collect();
        // 50 draws from a million-code space should essentially never
        // all collapse to one value
        assert!(codes.len() > 1);
    }
}
