//! In-process gateway simulator
//!
//! Tracks charge state transitions the way the real processor does, so
//! local runs and integration tests exercise the full authorize,
//! capture, cancel, refund lifecycle without a network. Declines and
//! outages are scriptable per operation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use core_kernel::Money;
use domain_payment::{
    AuthorizeRequest, GatewayAuthorization, GatewayChargeStatus, GatewayError, PaymentGatewayPort,
};

#[derive(Debug, Clone)]
struct ChargeState {
    status: GatewayChargeStatus,
    amount_cents: i64,
    refunded_cents: i64,
}

#[derive(Default)]
pub struct MockGateway {
    charges: Mutex<HashMap<String, ChargeState>>,
    sequence: AtomicU64,
    /// Next N captures fail with a decline
    decline_captures: AtomicU32,
    /// Next N calls fail as unavailable
    outage_calls: AtomicU32,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `count` capture calls to decline
    pub fn decline_next_captures(&self, count: u32) {
        self.decline_captures.store(count, Ordering::SeqCst);
    }

    /// Scripts the next `count` calls to fail as unavailable
    pub fn outage_for_calls(&self, count: u32) {
        self.outage_calls.store(count, Ordering::SeqCst);
    }

    pub fn charge_status(&self, handle: &str) -> Option<GatewayChargeStatus> {
        self.charges
            .lock()
            .ok()
            .and_then(|c| c.get(handle).map(|s| s.status))
    }

    fn check_outage(&self) -> Result<(), GatewayError> {
        let remaining = self.outage_calls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.outage_calls.store(remaining - 1, Ordering::SeqCst);
            return Err(GatewayError::unavailable("simulated outage"));
        }
        Ok(())
    }

    fn with_charges<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, ChargeState>) -> Result<R, GatewayError>,
    ) -> Result<R, GatewayError> {
        let mut charges = self
            .charges
            .lock()
            .map_err(|_| GatewayError::unavailable("mock gateway lock poisoned"))?;
        f(&mut charges)
    }
}

#[async_trait]
impl PaymentGatewayPort for MockGateway {
    async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> Result<GatewayAuthorization, GatewayError> {
        self.check_outage()?;
        let handle = format!("pi_mock_{}", self.sequence.fetch_add(1, Ordering::SeqCst));
        let status = if request.strong_auth {
            GatewayChargeStatus::RequiresAction
        } else {
            GatewayChargeStatus::RequiresCapture
        };
        self.with_charges(|charges| {
            charges.insert(
                handle.clone(),
                ChargeState {
                    // The simulated payer completes strong auth instantly,
                    // so the stored charge is already capturable
                    status: GatewayChargeStatus::RequiresCapture,
                    amount_cents: request.amount.cents(),
                    refunded_cents: 0,
                },
            );
            Ok(())
        })?;
        Ok(GatewayAuthorization { handle, status })
    }

    async fn capture(&self, handle: &str, amount: Money) -> Result<String, GatewayError> {
        self.check_outage()?;
        let declines = self.decline_captures.load(Ordering::SeqCst);
        if declines > 0 {
            self.decline_captures.store(declines - 1, Ordering::SeqCst);
            return Err(GatewayError::rejected("card declined"));
        }
        self.with_charges(|charges| {
            let charge = charges
                .get_mut(handle)
                .ok_or_else(|| GatewayError::rejected(format!("no such charge {handle}")))?;
            match charge.status {
                GatewayChargeStatus::RequiresCapture => {
                    if amount.cents() > charge.amount_cents {
                        return Err(GatewayError::rejected("capture exceeds authorized amount"));
                    }
                    charge.status = GatewayChargeStatus::Captured;
                    Ok(format!("ch_{handle}"))
                }
                other => Err(GatewayError::NotCapturable {
                    state: format!("{other:?}").to_lowercase(),
                }),
            }
        })
    }

    async fn cancel(&self, handle: &str) -> Result<(), GatewayError> {
        self.check_outage()?;
        self.with_charges(|charges| {
            let charge = charges
                .get_mut(handle)
                .ok_or_else(|| GatewayError::rejected(format!("no such charge {handle}")))?;
            match charge.status {
                GatewayChargeStatus::RequiresCapture | GatewayChargeStatus::RequiresAction => {
                    charge.status = GatewayChargeStatus::Cancelled;
                    Ok(())
                }
                GatewayChargeStatus::Cancelled => Ok(()),
                other => Err(GatewayError::NotCapturable {
                    state: format!("{other:?}").to_lowercase(),
                }),
            }
        })
    }

    async fn refund(&self, handle: &str, amount: Money) -> Result<String, GatewayError> {
        self.check_outage()?;
        self.with_charges(|charges| {
            let charge = charges
                .get_mut(handle)
                .ok_or_else(|| GatewayError::rejected(format!("no such charge {handle}")))?;
            if charge.status != GatewayChargeStatus::Captured {
                return Err(GatewayError::rejected("cannot refund an uncaptured charge"));
            }
            if charge.refunded_cents + amount.cents() > charge.amount_cents {
                return Err(GatewayError::rejected("refund exceeds captured amount"));
            }
            charge.refunded_cents += amount.cents();
            Ok(format!("re_{handle}_{}", charge.refunded_cents))
        })
    }

    async fn retrieve(&self, handle: &str) -> Result<GatewayChargeStatus, GatewayError> {
        self.check_outage()?;
        self.with_charges(|charges| {
            charges
                .get(handle)
                .map(|c| c.status)
                .ok_or_else(|| GatewayError::rejected(format!("no such charge {handle}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{BookingId, Currency, UserId};

    fn request(cents: i64) -> AuthorizeRequest {
        AuthorizeRequest {
            amount: Money::from_minor(cents, Currency::USD),
            payer_id: UserId::new(),
            booking_id: BookingId::new(),
            destination_account: "acct_1".to_string(),
            application_fee: Money::from_minor(cents / 20, Currency::USD),
            strong_auth: false,
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let gw = MockGateway::new();
        let reservation = gw.authorize(request(10_000)).await.unwrap();
        assert_eq!(reservation.status, GatewayChargeStatus::RequiresCapture);

        let reference = gw
            .capture(&reservation.handle, Money::from_minor(10_000, Currency::USD))
            .await
            .unwrap();
        assert!(reference.starts_with("ch_"));
        assert_eq!(
            gw.retrieve(&reservation.handle).await.unwrap(),
            GatewayChargeStatus::Captured
        );

        gw.refund(&reservation.handle, Money::from_minor(4_000, Currency::USD))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_captured_charge_cannot_be_voided() {
        let gw = MockGateway::new();
        let reservation = gw.authorize(request(5_000)).await.unwrap();
        gw.capture(&reservation.handle, Money::from_minor(5_000, Currency::USD))
            .await
            .unwrap();

        let err = gw.cancel(&reservation.handle).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotCapturable { .. }));
    }

    #[tokio::test]
    async fn test_scripted_decline_burns_down() {
        let gw = MockGateway::new();
        let reservation = gw.authorize(request(5_000)).await.unwrap();
        gw.decline_next_captures(1);

        let first = gw
            .capture(&reservation.handle, Money::from_minor(5_000, Currency::USD))
            .await;
        assert!(matches!(first, Err(GatewayError::Rejected { .. })));

        gw.capture(&reservation.handle, Money::from_minor(5_000, Currency::USD))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_outage_hides_the_real_outcome() {
        let gw = MockGateway::new();
        let reservation = gw.authorize(request(5_000)).await.unwrap();
        gw.outage_for_calls(1);

        let err = gw
            .capture(&reservation.handle, Money::from_minor(5_000, Currency::USD))
            .await
            .unwrap_err();
        assert!(err.is_ambiguous());
        // The charge itself is untouched and still capturable
        assert_eq!(
            gw.charge_status(&reservation.handle),
            Some(GatewayChargeStatus::RequiresCapture)
        );
    }
}
