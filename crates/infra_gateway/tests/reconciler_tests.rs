//! Reconciliation against the gateway simulator

use chrono::{Duration, Utc};
use std::sync::Arc;

use core_kernel::{BookingId, Currency, InMemorySettings, Money, TripId, UserId};
use domain_payment::{
    AuthorizationService, AuthorizationStatus, BookingSnapshot, CaptureReason,
    InMemoryAuthorizationStore, InMemoryEventLog, NotificationOutbox, PaymentGatewayPort,
    StaticBookingPort, TransactionKind, TransactionStatus,
};
use domain_scheduler::InMemoryJobStore;
use infra_gateway::{MockGateway, ReconcileOutcome, Reconciler};

struct Harness {
    service: AuthorizationService<InMemoryAuthorizationStore, InMemoryJobStore>,
    reconciler: Reconciler<InMemoryAuthorizationStore, InMemoryJobStore>,
    gateway: Arc<MockGateway>,
    booking: Arc<StaticBookingPort>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryAuthorizationStore::new());
    let jobs = Arc::new(InMemoryJobStore::new());
    let gateway = Arc::new(MockGateway::new());
    let booking = Arc::new(StaticBookingPort::new());
    let event_log = Arc::new(InMemoryEventLog::new());

    let service = AuthorizationService::new(
        Arc::clone(&store),
        Arc::clone(&jobs),
        Arc::clone(&gateway) as Arc<dyn PaymentGatewayPort>,
        Arc::clone(&booking) as Arc<dyn domain_payment::BookingPort>,
        Arc::clone(&event_log) as Arc<dyn domain_payment::EventLogPort>,
        Arc::new(NotificationOutbox::new()),
        Arc::new(InMemorySettings::new()),
    );
    let reconciler = Reconciler::new(
        store,
        jobs,
        Arc::clone(&gateway) as Arc<dyn PaymentGatewayPort>,
        event_log,
    );
    Harness {
        service,
        reconciler,
        gateway,
        booking,
    }
}

fn snapshot() -> BookingSnapshot {
    BookingSnapshot {
        booking_id: BookingId::new(),
        trip_id: TripId::new(),
        sender_id: UserId::new(),
        traveler_id: UserId::new(),
        amount: Money::from_minor(10_000, Currency::USD),
        departure_at: Utc::now() + Duration::hours(96),
        destination_account: Some("acct_traveler".to_string()),
        traveler_confirmed_bookings: 0,
    }
}

/// Simulates a crash after the processor captured but before the
/// response landed: remote is captured, local still thinks it failed.
async fn diverge_after_remote_capture(h: &Harness) -> domain_payment::PaymentAuthorization {
    let snap = snapshot();
    let booking_id = snap.booking_id;
    h.booking.register(snap);

    let auth = h.service.create_authorization(booking_id).await.unwrap();
    h.service.confirm(auth.id(), auth.payer_id()).await.unwrap();

    let auth = h.service.get(auth.id()).await.unwrap();
    let handle = auth.gateway_handle().unwrap().to_string();
    h.gateway
        .capture(&handle, auth.amount())
        .await
        .unwrap();

    // The local retry now fails (the charge is no longer capturable) and
    // leaves a failed capture transaction behind
    let retry = h.service.capture(auth.id(), CaptureReason::Automatic).await;
    assert!(retry.is_err());
    h.service.get(auth.id()).await.unwrap()
}

#[tokio::test]
async fn test_sweep_adopts_remote_capture() {
    let h = harness();
    let auth = diverge_after_remote_capture(&h).await;
    assert_eq!(auth.status(), AuthorizationStatus::Failed);

    let report = h.reconciler.run_once().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.adopted_captures, 1);
    assert_eq!(report.unresolved, 0);

    let converged = h.service.get(auth.id()).await.unwrap();
    assert_eq!(converged.status(), AuthorizationStatus::Captured);

    let txns = h.service.transactions(auth.id()).await.unwrap();
    let settled_capture = txns.iter().any(|t| {
        t.kind == TransactionKind::Capture
            && t.status == TransactionStatus::Settled
            && t.gateway_reference
                .as_deref()
                .is_some_and(|r| r.starts_with("reconciled:"))
    });
    assert!(settled_capture);
}

#[tokio::test]
async fn test_sweep_adopts_remote_cancellation() {
    let h = harness();
    let snap = snapshot();
    let booking_id = snap.booking_id;
    h.booking.register(snap);

    let auth = h.service.create_authorization(booking_id).await.unwrap();
    h.service.confirm(auth.id(), auth.payer_id()).await.unwrap();

    // Remote void lands without the local side hearing about it
    let handle = h
        .service
        .get(auth.id())
        .await
        .unwrap()
        .gateway_handle()
        .unwrap()
        .to_string();
    h.gateway.cancel(&handle).await.unwrap();

    let retry = h.service.capture(auth.id(), CaptureReason::Manual).await;
    assert!(retry.is_err());

    let report = h.reconciler.run_once().await.unwrap();
    assert_eq!(report.adopted_cancellations, 1);

    let converged = h.service.get(auth.id()).await.unwrap();
    assert_eq!(converged.status(), AuthorizationStatus::Cancelled);
}

#[tokio::test]
async fn test_unreachable_gateway_defers_reconciliation() {
    let h = harness();
    let auth = diverge_after_remote_capture(&h).await;

    h.gateway.outage_for_calls(1);
    let outcome = h.reconciler.reconcile(auth.id()).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unresolved);

    // Untouched locally, converges on the next attempt
    assert_eq!(
        h.service.get(auth.id()).await.unwrap().status(),
        AuthorizationStatus::Failed
    );
    let outcome = h.reconciler.reconcile(auth.id()).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::AdoptedCapture);
}

#[tokio::test]
async fn test_sweep_skips_healthy_authorizations() {
    let h = harness();
    let snap = snapshot();
    let booking_id = snap.booking_id;
    h.booking.register(snap);

    let auth = h.service.create_authorization(booking_id).await.unwrap();
    h.service.confirm(auth.id(), auth.payer_id()).await.unwrap();

    // Confirmed with no failed captures: nothing to examine
    let report = h.reconciler.run_once().await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(
        h.service.get(auth.id()).await.unwrap().status(),
        AuthorizationStatus::Confirmed
    );
}
