//! Cancellation engine
//!
//! Classifies a cancellation, checks the allowance, settles the money
//! split against the gateway and the escrow account, and drives the
//! authorization to `cancelled`. Every guard runs before the first
//! mutation so a denied request leaves no partial state.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use core_kernel::{AuthorizationId, Money, PaymentPolicy, SettingsPort, TripId, UserId};
use domain_payment::ports::{AuthorizationStore, BookingPort};
use domain_payment::{
    AuthorizationStatus, EventKind, EventLogPort, EventRecord, LedgerTransaction, NoticeKind,
    NotificationOutbox, PaymentAuthorization, PaymentError, PaymentGatewayPort, TransactionKind,
    TransitionNotice,
};
use domain_scheduler::{JobKind, JobStore};

use crate::allowance::{AllowancePeriod, CancellationLedger};
use crate::error::CancellationError;
use crate::policy::{
    classify, compute_split, CancellationActor, CancellationBucket, CancellationContext,
    CancellationSplit,
};

/// Reliability-score deduction applied when a traveler cancels while
/// carrying confirmed bookings
const TRAVELER_RELIABILITY_PENALTY: u32 = 10;

/// One booking's cancellation request
#[derive(Debug, Clone)]
pub struct CancellationRequest {
    pub authorization_id: AuthorizationId,
    pub actor_id: UserId,
    pub actor: CancellationActor,
    pub reason: String,
    pub no_show: bool,
}

/// What the caller gets back, including the percentage so the UI never
/// recomputes it
#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub authorization_id: AuthorizationId,
    pub bucket: CancellationBucket,
    pub refund: Money,
    pub compensation: Money,
    pub refund_percent: Decimal,
    /// Present when the traveler's allowance was charged
    pub reliability_penalty: Option<u32>,
}

pub struct CancellationEngine<S, J> {
    store: Arc<S>,
    jobs: Arc<J>,
    gateway: Arc<dyn PaymentGatewayPort>,
    booking: Arc<dyn BookingPort>,
    event_log: Arc<dyn EventLogPort>,
    outbox: Arc<NotificationOutbox>,
    ledger: Arc<dyn CancellationLedger>,
    settings: Arc<dyn SettingsPort>,
}

impl<S, J> CancellationEngine<S, J>
where
    S: AuthorizationStore,
    J: JobStore,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        jobs: Arc<J>,
        gateway: Arc<dyn PaymentGatewayPort>,
        booking: Arc<dyn BookingPort>,
        event_log: Arc<dyn EventLogPort>,
        outbox: Arc<NotificationOutbox>,
        ledger: Arc<dyn CancellationLedger>,
        settings: Arc<dyn SettingsPort>,
    ) -> Self {
        Self {
            store,
            jobs,
            gateway,
            booking,
            event_log,
            outbox,
            ledger,
            settings,
        }
    }

    /// Cancels one booking's authorization
    pub async fn cancel(
        &self,
        request: CancellationRequest,
    ) -> Result<CancellationOutcome, CancellationError> {
        let policy = PaymentPolicy::load(self.settings.as_ref())
            .await
            .map_err(PaymentError::from)?;
        let auth = self.store.get(request.authorization_id).await?;

        self.check_standing(&auth, &request)?;
        if auth.is_terminal() {
            return Err(CancellationError::NotCancellable {
                status: auth.status(),
            });
        }

        let bucket = classify(
            &CancellationContext {
                actor: request.actor,
                authorization_status: auth.status(),
                departure_at: auth.departure_at(),
                now: Utc::now(),
                traveler_confirmed_bookings: self.confirmed_bookings_for(&auth).await,
                no_show: request.no_show,
            },
            &policy,
        );

        let traveler_id = auth.traveler_id();
        if bucket.charges_allowance() {
            self.check_allowance(traveler_id, &policy).await?;
        }

        let outcome = self.settle_one(auth, bucket, &request, &policy).await?;

        if bucket.charges_allowance() {
            self.ledger.record(traveler_id, Utc::now()).await?;
        }
        Ok(outcome)
    }

    /// Cancels every active booking on a trip (traveler-initiated)
    ///
    /// All bookings settle under the traveler-with-bookings bucket, but
    /// the monthly allowance is charged once per trip, not per booking.
    pub async fn cancel_trip(
        &self,
        trip_id: TripId,
        traveler_id: UserId,
        reason: &str,
    ) -> Result<Vec<CancellationOutcome>, CancellationError> {
        let policy = PaymentPolicy::load(self.settings.as_ref())
            .await
            .map_err(PaymentError::from)?;
        let active = self.store.list_active_for_trip(trip_id).await?;

        if let Some(stranger) = active.iter().find(|a| a.traveler_id() != traveler_id) {
            return Err(CancellationError::Unauthorized(format!(
                "booking {} on this trip belongs to a different traveler",
                stranger.booking_id()
            )));
        }

        let confirmed = active
            .iter()
            .filter(|a| a.status() == AuthorizationStatus::Confirmed)
            .count() as u32;
        let bucket = if confirmed > 0 {
            CancellationBucket::TravelerWithBookings
        } else {
            CancellationBucket::Free
        };

        if bucket.charges_allowance() {
            self.check_allowance(traveler_id, &policy).await?;
        }

        let mut outcomes = Vec::with_capacity(active.len());
        for auth in active {
            let request = CancellationRequest {
                authorization_id: auth.id(),
                actor_id: traveler_id,
                actor: CancellationActor::Traveler,
                reason: reason.to_string(),
                no_show: false,
            };
            outcomes.push(self.settle_one(auth, bucket, &request, &policy).await?);
        }

        if bucket.charges_allowance() {
            self.ledger.record(traveler_id, Utc::now()).await?;
        }

        info!(
            trip_id = %trip_id,
            cancelled = outcomes.len(),
            bucket = %bucket,
            "trip cancelled"
        );
        Ok(outcomes)
    }

    /// Settles gateway, escrow, ledger, jobs, events, and notices for one
    /// authorization
    async fn settle_one(
        &self,
        mut auth: PaymentAuthorization,
        bucket: CancellationBucket,
        request: &CancellationRequest,
        policy: &PaymentPolicy,
    ) -> Result<CancellationOutcome, CancellationError> {
        let loaded_version = auth.version();
        let split = compute_split(auth.amount(), bucket, policy)
            .map_err(PaymentError::from)?;

        // Money moves first: a gateway failure here denies the whole
        // cancellation with no local state touched.
        self.settle_gateway(&auth, bucket, &split).await?;

        auth.cancel(Some(request.actor_id), &request.reason)?;
        self.store.update(&auth, loaded_version).await?;
        self.settle_escrow(&auth, &split).await?;
        self.record_transactions(&auth, &split).await?;
        self.jobs
            .cancel_for_authorization(
                auth.id(),
                &[
                    JobKind::AutoCapture,
                    JobKind::Expiry,
                    JobKind::ConfirmationReminder,
                    JobKind::PaymentReminder,
                ],
            )
            .await
            .map_err(|e| CancellationError::Payment(PaymentError::Conflict(e.to_string())))?;

        for event in auth.take_events() {
            self.event_log
                .append(EventRecord::from_domain_event(&event))
                .await?;
        }
        self.event_log
            .append(EventRecord::new(
                auth.id(),
                auth.booking_id(),
                EventKind::RefundIssued,
                Some(request.actor_id),
                serde_json::json!({
                    "bucket": bucket.as_str(),
                    "refund_cents": split.refund.cents(),
                    "compensation_cents": split.compensation.cents(),
                    "refund_percent": split.refund_percent,
                }),
            ))
            .await?;
        if split.compensation.is_positive() {
            self.event_log
                .append(EventRecord::new(
                    auth.id(),
                    auth.booking_id(),
                    EventKind::CompensationPaid,
                    None,
                    serde_json::json!({ "amount_cents": split.compensation.cents() }),
                ))
                .await?;
        }

        // Each side's notice carries the amount that moves toward them.
        self.outbox.enqueue(TransitionNotice::new(
            auth.payer_id(),
            auth.id(),
            auth.booking_id(),
            NoticeKind::CancellationProcessed,
            split.refund,
        ))?;
        self.outbox.enqueue(TransitionNotice::new(
            auth.traveler_id(),
            auth.id(),
            auth.booking_id(),
            NoticeKind::CancellationProcessed,
            split.compensation,
        ))?;
        self.booking
            .payment_state_changed(auth.booking_id(), auth.status())
            .await?;

        info!(
            authorization_id = %auth.id(),
            bucket = %bucket,
            refund_cents = split.refund.cents(),
            compensation_cents = split.compensation.cents(),
            "cancellation settled"
        );

        Ok(CancellationOutcome {
            authorization_id: auth.id(),
            bucket,
            refund: split.refund,
            compensation: split.compensation,
            refund_percent: split.refund_percent,
            reliability_penalty: bucket
                .charges_allowance()
                .then_some(TRAVELER_RELIABILITY_PENALTY),
        })
    }

    /// Moves the money at the processor according to the split
    ///
    /// A reservation with nothing disbursed is voided. Any split that
    /// pays the traveler needs the funds captured first, then the
    /// sender's share refunded.
    async fn settle_gateway(
        &self,
        auth: &PaymentAuthorization,
        bucket: CancellationBucket,
        split: &CancellationSplit,
    ) -> Result<(), CancellationError> {
        let Some(handle) = auth.gateway_handle() else {
            // Never reserved; nothing to unwind remotely
            return Ok(());
        };

        if split.compensation.is_zero() {
            // Pure reversal: void the hold so the payer is never charged
            match self.gateway.cancel(handle).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    warn!(
                        authorization_id = %auth.id(),
                        bucket = %bucket,
                        error = %err,
                        "cancellation denied, gateway void failed"
                    );
                    Err(CancellationError::Payment(err.into()))
                }
            }
        } else {
            // Compensation requires real funds: capture, then refund the
            // sender's share
            self.gateway
                .capture(handle, auth.amount())
                .await
                .map_err(|e| CancellationError::Payment(e.into()))?;
            if split.refund.is_positive() {
                self.gateway
                    .refund(handle, split.refund)
                    .await
                    .map_err(|e| CancellationError::Payment(e.into()))?;
            }
            Ok(())
        }
    }

    async fn settle_escrow(
        &self,
        auth: &PaymentAuthorization,
        split: &CancellationSplit,
    ) -> Result<(), CancellationError> {
        if let Some(mut escrow) = self.store.escrow_for(auth.id()).await? {
            if split.refund.is_positive() {
                escrow.refund(split.refund).map_err(PaymentError::from)?;
            }
            // Compensation and the unrecoverable gateway fee both leave
            // through the release leg; together with the refund they
            // settle the account exactly.
            let release = escrow.available();
            if release.is_positive() {
                escrow.release(release).map_err(PaymentError::from)?;
            }
            self.store.save_escrow(&escrow).await?;
        }
        Ok(())
    }

    async fn record_transactions(
        &self,
        auth: &PaymentAuthorization,
        split: &CancellationSplit,
    ) -> Result<(), CancellationError> {
        if split.refund.is_positive() {
            let txn = LedgerTransaction::new(
                auth.id(),
                auth.booking_id(),
                TransactionKind::Refund,
                split.refund,
            )
            .settle("cancellation_refund");
            self.store.record_transaction(&txn).await?;
        }
        if split.compensation.is_positive() {
            let txn = LedgerTransaction::new(
                auth.id(),
                auth.booking_id(),
                TransactionKind::Compensation,
                split.compensation,
            )
            .settle("cancellation_compensation");
            self.store.record_transaction(&txn).await?;
        }
        Ok(())
    }

    fn check_standing(
        &self,
        auth: &PaymentAuthorization,
        request: &CancellationRequest,
    ) -> Result<(), CancellationError> {
        let expected = match request.actor {
            CancellationActor::Sender => auth.payer_id(),
            CancellationActor::Traveler => auth.traveler_id(),
        };
        if request.actor_id != expected {
            return Err(CancellationError::Unauthorized(format!(
                "{} is not the booking's {:?}",
                request.actor_id, request.actor
            )));
        }
        Ok(())
    }

    async fn check_allowance(
        &self,
        traveler: UserId,
        policy: &PaymentPolicy,
    ) -> Result<(), CancellationError> {
        let period = AllowancePeriod::containing(Utc::now());
        let used = self.ledger.count(traveler, period).await?;
        if used >= policy.monthly_cancellation_allowance {
            return Err(CancellationError::LimitExceeded {
                used,
                allowance: policy.monthly_cancellation_allowance,
            });
        }
        Ok(())
    }

    /// How many confirmed bookings the traveler still carries on the
    /// authorization's trip
    async fn confirmed_bookings_for(&self, auth: &PaymentAuthorization) -> u32 {
        match self.store.list_active_for_trip(auth.trip_id()).await {
            Ok(active) => active
                .iter()
                .filter(|a| a.status() == AuthorizationStatus::Confirmed)
                .count() as u32,
            Err(err) => {
                warn!(trip_id = %auth.trip_id(), error = %err, "trip lookup failed, assuming no confirmed bookings");
                0
            }
        }
    }
}
