//! End-to-end engine scenarios
//!
//! Each test walks a complete booking-to-settlement story through the
//! wired engine: service, cancellation engine, queue, escrow, ledger,
//! event log, and outbox together.

use rust_decimal_macros::dec;

use core_kernel::{settings::keys, SettingValue, SettingsPort, TripId, UserId};
use domain_cancellation::{
    CancellationActor, CancellationBucket, CancellationError, CancellationRequest,
};
use domain_payment::{
    AuthorizationStatus, AuthorizationStore, CaptureReason, EscrowStatus, EventKind, FeeBreakdown,
    NoticeKind, PaymentError, TransactionKind, TransactionStatus,
};
use domain_scheduler::{JobKind, JobStore};
use test_utils::{
    assert_cents, assert_conserves, BookingSnapshotBuilder, MoneyFixtures, PaymentHarness,
    TemporalFixtures,
};

/// Happy path: authorize, confirm, capture
///
/// A $100.00 booking carries a $5.00 platform fee, and capture settles
/// the full amount, draining the escrow hold toward the payout.
#[tokio::test]
async fn test_full_lifecycle_settles_the_booking_amount() {
    let h = PaymentHarness::new();
    let sender = UserId::new();
    let booking_id = h.register(
        BookingSnapshotBuilder::new()
            .with_sender(sender)
            .with_amount(MoneyFixtures::usd_100())
            .departing_in_hours(72),
    );

    let auth = h.service.create_authorization(booking_id).await.unwrap();
    assert_eq!(auth.status(), AuthorizationStatus::Pending);
    assert_cents(auth.platform_fee(), 500);

    let fees = FeeBreakdown::compute(auth.amount(), &h.service.policy().await.unwrap()).unwrap();
    assert_cents(fees.traveler_payout, 9_500);
    assert_conserves(fees.total, &[fees.platform_fee, fees.traveler_payout]);

    // Held in full until capture moves the money
    let escrow = h.store.escrow_for(auth.id()).await.unwrap().unwrap();
    assert_eq!(escrow.status(), EscrowStatus::Held);
    assert_cents(escrow.held(), 10_000);
    assert_cents(escrow.released(), 0);

    let confirmed = h.service.confirm(auth.id(), sender).await.unwrap();
    assert_eq!(confirmed.status(), AuthorizationStatus::Confirmed);

    // Confirmation hands the sender a handover verification code
    let code = confirmed.delivery_code().unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    let captured = h
        .service
        .capture(auth.id(), CaptureReason::Manual)
        .await
        .unwrap();
    assert_eq!(captured.status(), AuthorizationStatus::Captured);
    assert!(captured.captured_at().is_some());

    let txns = h.service.transactions(auth.id()).await.unwrap();
    let capture_txn = txns
        .iter()
        .find(|t| t.kind == TransactionKind::Capture)
        .unwrap();
    assert_eq!(capture_txn.status, TransactionStatus::Settled);
    assert_cents(capture_txn.amount, 10_000);

    let escrow = h.store.escrow_for(auth.id()).await.unwrap().unwrap();
    assert_eq!(escrow.status(), EscrowStatus::Settled);
    assert_cents(escrow.held(), 10_000);
    assert_cents(escrow.released(), 10_000);
    assert_cents(escrow.refunded(), 0);

    let notices = h.outbox.drain().unwrap();
    let captured = notices
        .iter()
        .find(|n| n.kind == NoticeKind::PaymentCaptured)
        .unwrap();
    assert_cents(captured.amount, 10_000);
}

/// Nothing confirmed by the deadline: the hold is released, never
/// captured
#[tokio::test]
async fn test_unconfirmed_authorization_expires_without_a_capture() {
    let h = PaymentHarness::new();
    let sender = UserId::new();
    let booking_id = h.register(BookingSnapshotBuilder::new().with_sender(sender));

    let auth = h.service.create_authorization(booking_id).await.unwrap();

    // The service queued the confirmation-window maintenance jobs
    let pending = h.jobs.pending_for_authorization(auth.id()).await.unwrap();
    assert!(pending.iter().any(|j| j.kind == JobKind::Expiry));
    let expiry = pending.iter().find(|j| j.kind == JobKind::Expiry).unwrap();
    assert_eq!(Some(expiry.scheduled_at), auth.active_deadline());

    // What the expiry job does once the deadline has elapsed
    let expired = h.service.expire(auth.id()).await.unwrap();
    assert_eq!(expired.status(), AuthorizationStatus::Expired);

    let txns = h.service.transactions(auth.id()).await.unwrap();
    assert!(txns.iter().all(|t| t.kind != TransactionKind::Capture));

    let remaining = h.jobs.pending_for_authorization(auth.id()).await.unwrap();
    assert!(remaining.is_empty());

    let timeline = h.service.timeline(auth.id()).await.unwrap();
    assert!(timeline
        .iter()
        .any(|e| e.kind == EventKind::AuthorizationExpired));
}

/// Traveler bails on a trip carrying two confirmed bookings
///
/// Both senders get a full refund minus the unrecoverable gateway fee,
/// and the traveler's monthly allowance is charged exactly once.
#[tokio::test]
async fn test_trip_cancellation_refunds_every_confirmed_booking() {
    let h = PaymentHarness::new();
    let trip = TripId::new();
    let traveler = UserId::new();
    let senders = [UserId::new(), UserId::new()];

    let mut auth_ids = Vec::new();
    for sender in senders {
        let booking_id = h.register(
            BookingSnapshotBuilder::new()
                .with_trip(trip)
                .with_traveler(traveler)
                .with_sender(sender)
                .with_amount(MoneyFixtures::usd_100())
                .departing_in_hours(40),
        );
        let auth = h.confirmed_authorization(booking_id, sender).await.unwrap();
        auth_ids.push(auth.id());
    }

    let outcomes = h
        .cancellations
        .cancel_trip(trip, traveler, "trip called off")
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert_eq!(outcome.bucket, CancellationBucket::TravelerWithBookings);
        // $100.00 minus the 2.9% processing fee
        assert_cents(outcome.refund, 9_710);
        assert_cents(outcome.compensation, 0);
        assert_eq!(outcome.refund_percent, dec!(97.10));
    }

    for id in auth_ids {
        let auth = h.service.get(id).await.unwrap();
        assert_eq!(auth.status(), AuthorizationStatus::Cancelled);
        let txns = h.service.transactions(id).await.unwrap();
        assert!(txns.iter().any(|t| t.kind == TransactionKind::Refund));
    }

    // One allowance charge for the whole trip, so a second
    // cancellation this month is refused
    let booking_id = h.register(
        BookingSnapshotBuilder::new()
            .with_traveler(traveler)
            .with_confirmed_bookings(1)
            .departing_in_hours(60),
    );
    let auth = h
        .confirmed_authorization(booking_id, UserId::new())
        .await
        .unwrap();
    let refused = h
        .cancellations
        .cancel(CancellationRequest {
            authorization_id: auth.id(),
            actor_id: traveler,
            actor: CancellationActor::Traveler,
            reason: "changed plans again".to_string(),
            no_show: false,
        })
        .await;
    assert!(matches!(
        refused,
        Err(CancellationError::LimitExceeded {
            used: 1,
            allowance: 1,
        })
    ));
}

/// Sender cancels a confirmed booking 12 hours before departure: the
/// net amount splits evenly between sender and traveler
#[tokio::test]
async fn test_late_sender_cancellation_splits_the_net_evenly() {
    let h = PaymentHarness::new();
    let sender = UserId::new();
    let booking_id = h.register(
        BookingSnapshotBuilder::new()
            .with_sender(sender)
            .with_amount(MoneyFixtures::usd_100())
            .departing_in_hours(12),
    );
    let auth = h.confirmed_authorization(booking_id, sender).await.unwrap();

    let outcome = h
        .cancellations
        .cancel(CancellationRequest {
            authorization_id: auth.id(),
            actor_id: sender,
            actor: CancellationActor::Sender,
            reason: "shipment no longer needed".to_string(),
            no_show: false,
        })
        .await
        .unwrap();

    assert_eq!(outcome.bucket, CancellationBucket::Late);
    // Net of the 2.9% gateway fee: 9710 split down the middle
    assert_cents(outcome.refund, 4_855);
    assert_cents(outcome.compensation, 4_855);
    assert_eq!(outcome.reliability_penalty, None);

    let txns = h.service.transactions(auth.id()).await.unwrap();
    let refund = txns
        .iter()
        .find(|t| t.kind == TransactionKind::Refund)
        .unwrap();
    let compensation = txns
        .iter()
        .find(|t| t.kind == TransactionKind::Compensation)
        .unwrap();
    assert_eq!(refund.booking_id, compensation.booking_id);
    assert_cents(refund.amount, 4_855);
    assert_cents(compensation.amount, 4_855);

    let timeline = h.service.timeline(auth.id()).await.unwrap();
    assert!(timeline.iter().any(|e| e.kind == EventKind::RefundIssued));
    assert!(timeline
        .iter()
        .any(|e| e.kind == EventKind::CompensationPaid));
}

/// The processor declines every capture attempt: the queue retries
/// until the attempt budget is spent, then flags an operator
#[tokio::test]
async fn test_exhausted_capture_attempts_raise_an_operator_alert() {
    let h = PaymentHarness::new();
    h.settings
        .put(keys::MAX_CAPTURE_ATTEMPTS, SettingValue::Integer(3))
        .await
        .unwrap();

    let sender = UserId::new();
    let booking_id = h.register(
        BookingSnapshotBuilder::new()
            .with_sender(sender)
            .departing_in_hours(72),
    );
    let auth = h.confirmed_authorization(booking_id, sender).await.unwrap();

    h.gateway.decline_next_captures(3);
    // Sweep far enough past the auto-capture time to cover every
    // retry backoff
    let swept = h
        .run_due_jobs(TemporalFixtures::hours_ahead(400))
        .await
        .unwrap();
    assert!(swept >= 3);

    let failed = h.service.get(auth.id()).await.unwrap();
    assert_eq!(failed.status(), AuthorizationStatus::Failed);
    assert_eq!(failed.capture_attempts(), 3);

    let stats = h.jobs.stats().await.unwrap();
    assert_eq!(stats.failed, 1);

    let capture_job = h
        .jobs
        .pending_for_authorization(auth.id())
        .await
        .unwrap()
        .into_iter()
        .find(|j| j.kind == JobKind::AutoCapture);
    assert!(capture_job.is_none());

    let timeline = h.service.timeline(auth.id()).await.unwrap();
    assert!(timeline.iter().any(|e| e.kind == EventKind::OperatorAlert));

    let txns = h.service.transactions(auth.id()).await.unwrap();
    let failed_captures = txns
        .iter()
        .filter(|t| t.kind == TransactionKind::Capture && t.status == TransactionStatus::Failed)
        .count();
    assert_eq!(failed_captures, 3);

    // A manual retry stays available once the processor recovers
    let recovered = h
        .service
        .capture(auth.id(), CaptureReason::Manual)
        .await
        .unwrap();
    assert_eq!(recovered.status(), AuthorizationStatus::Captured);
}

/// Traveler not yet onboarded: the authorization waits in
/// `pending_gateway_setup` until a payable account shows up
#[tokio::test]
async fn test_authorization_waits_for_traveler_onboarding() {
    let h = PaymentHarness::new();
    let booking_id = h.register(BookingSnapshotBuilder::new().without_destination_account());

    let auth = h.service.create_authorization(booking_id).await.unwrap();
    assert_eq!(auth.status(), AuthorizationStatus::PendingGatewaySetup);
    assert!(auth.gateway_handle().is_none());

    // Nothing is reserved yet, so capture has nothing to take
    let err = h
        .service
        .capture(auth.id(), CaptureReason::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidState { .. }));

    let attached = h
        .service
        .attach_gateway(auth.id(), "acct_late_onboard")
        .await
        .unwrap();
    assert_eq!(attached.status(), AuthorizationStatus::Pending);
    assert!(attached.gateway_handle().is_some());
}
